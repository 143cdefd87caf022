use std::path::Path;

use anyhow::{Context, Result};
use hubops::config::Settings;
use hubops::process::Tool;
use hubops::secrets::{AzKeyVault, SecretStore};
use tracing::info;

use crate::cli::output::print_infra_outputs;
use crate::{InfraApplyArgs, InfraOutputsArgs};

/// `terraform plan -detailed-exitcode` exit code when changes are pending.
const PLAN_EXIT_CHANGES: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlanOutcome {
    NoChanges,
    Changes,
}

/// Values the Terraform declaration re-exports from the key vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InfraOutputs {
    pub(crate) sp_app_id: String,
    pub(crate) sp_app_key: String,
    pub(crate) ssh_public_key: String,
}

pub(crate) async fn run_infra_plan(settings: &Settings) -> Result<()> {
    let terraform = terraform_tool(settings)?;
    let dir = &settings.infra.terraform_dir;
    terraform_init(&terraform, dir).await?;

    info!("Planning infrastructure in {}", dir.display());
    let status = terraform
        .status(&plan_args(dir))
        .await
        .context("terraform plan failed")?;
    match classify_plan(status.code())? {
        PlanOutcome::NoChanges => {
            println!("Infrastructure matches the declaration; no changes.");
        }
        PlanOutcome::Changes => {
            println!("Infrastructure differs from the declaration; run `hubops infra apply`.");
        }
    }
    Ok(())
}

pub(crate) async fn run_infra_apply(settings: &Settings, args: &InfraApplyArgs) -> Result<()> {
    let terraform = terraform_tool(settings)?;
    let dir = &settings.infra.terraform_dir;
    terraform_init(&terraform, dir).await?;

    info!("Applying infrastructure in {}", dir.display());
    let status = terraform
        .status(&apply_args(dir, args.auto_approve))
        .await
        .context("terraform apply failed")?;
    if !status.success() {
        anyhow::bail!("terraform apply failed with status: {status}");
    }
    println!("Infrastructure applied.");
    Ok(())
}

pub(crate) async fn run_infra_outputs(settings: &Settings, args: &InfraOutputsArgs) -> Result<()> {
    let timeout = settings.tool_timeout()?;
    let vault = AzKeyVault::new(
        Tool::new(&settings.tools.az, timeout),
        &settings.azure.vault_name,
    );
    let outputs = read_outputs(&vault, settings).await?;
    print_infra_outputs(&outputs, args.show_secrets);
    Ok(())
}

pub(crate) async fn read_outputs<S: SecretStore>(
    store: &S,
    settings: &Settings,
) -> Result<InfraOutputs> {
    let read = |name: &str| {
        let name = name.to_string();
        async move {
            store
                .get(&name)
                .await
                .map(|value| value.expose().to_string())
                .with_context(|| format!("Failed to read output secret {name}"))
        }
    };
    Ok(InfraOutputs {
        sp_app_id: read(&settings.infra.sp_app_id_secret).await?,
        sp_app_key: read(&settings.infra.sp_app_key_secret).await?,
        ssh_public_key: read(&settings.infra.ssh_public_key_secret).await?,
    })
}

fn terraform_tool(settings: &Settings) -> Result<Tool> {
    Ok(Tool::new(&settings.tools.terraform, settings.infra_timeout()?))
}

async fn terraform_init(terraform: &Tool, dir: &Path) -> Result<()> {
    info!("Initialising Terraform in {}", dir.display());
    let status = terraform
        .status(&init_args(dir))
        .await
        .context("terraform init failed")?;
    if !status.success() {
        anyhow::bail!("terraform init failed with status: {status}");
    }
    Ok(())
}

fn chdir_arg(dir: &Path) -> String {
    format!("-chdir={}", dir.display())
}

fn init_args(dir: &Path) -> Vec<String> {
    vec![
        chdir_arg(dir),
        "init".to_string(),
        "-input=false".to_string(),
    ]
}

fn plan_args(dir: &Path) -> Vec<String> {
    vec![
        chdir_arg(dir),
        "plan".to_string(),
        "-input=false".to_string(),
        "-detailed-exitcode".to_string(),
    ]
}

fn apply_args(dir: &Path, auto_approve: bool) -> Vec<String> {
    let mut args = vec![chdir_arg(dir), "apply".to_string()];
    if auto_approve {
        args.push("-auto-approve".to_string());
    }
    args
}

fn classify_plan(code: Option<i32>) -> Result<PlanOutcome> {
    match code {
        Some(0) => Ok(PlanOutcome::NoChanges),
        Some(PLAN_EXIT_CHANGES) => Ok(PlanOutcome::Changes),
        Some(code) => anyhow::bail!("terraform plan failed with exit code {code}"),
        None => anyhow::bail!("terraform plan was terminated by a signal"),
    }
}
