use anyhow::Result;
use hubops::cluster::Kubectl;
use hubops::config::Settings;
use hubops::materializer::{self, MaterializeOptions};
use hubops::process::Tool;
use hubops::secrets::AzKeyVault;
use tracing::info;

use crate::MaterializeArgs;
use crate::cli::output::print_materialize_report;

pub(crate) async fn run_materialize(settings: &Settings, args: &MaterializeArgs) -> Result<()> {
    let timeout = settings.tool_timeout()?;
    let secrets = AzKeyVault::new(
        Tool::new(&settings.tools.az, timeout),
        &settings.azure.vault_name,
    );
    let cluster = Kubectl::new(
        Tool::new(&settings.tools.kubectl, timeout),
        &settings.cluster.namespace,
    );
    let options = MaterializeOptions {
        wait: args.wait,
        poll_interval: args.poll_interval,
    };

    info!(
        "Materializing {} template(s) into {}",
        settings.templates.len(),
        settings.output_dir.display()
    );
    let report = materializer::run(settings, &secrets, &cluster, &options).await?;
    print_materialize_report(&report);
    Ok(())
}
