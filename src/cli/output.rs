use hubops::cluster::ServiceAddress;
use hubops::materializer::MaterializeReport;

use crate::commands::infra::InfraOutputs;

pub(crate) fn print_materialize_report(report: &MaterializeReport) {
    for path in &report.written {
        println!("Wrote {}", path.display());
    }
    match &report.status_address {
        ServiceAddress::Assigned(address) => {
            println!("{} IP: {address}", report.status_service);
        }
        ServiceAddress::Pending => println!(
            "{} IP: pending (the load balancer has no address yet; re-run later)",
            report.status_service
        ),
    }
}

pub(crate) fn print_infra_outputs(outputs: &InfraOutputs, show_secrets: bool) {
    println!("sp_app_id = {}", outputs.sp_app_id);
    println!(
        "sp_app_key = {}",
        display_secret(&outputs.sp_app_key, show_secrets)
    );
    println!("ssh_public_key = {}", outputs.ssh_public_key);
}

pub(crate) fn display_secret(value: &str, show_secrets: bool) -> String {
    if show_secrets {
        value.to_string()
    } else {
        mask_value(value)
    }
}

pub(crate) fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    if chars.len() <= 4 {
        "****".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}
