use std::path::{Path, PathBuf};

use anyhow::Result;
use hubops::config::Settings;
use hubops::process::Tool;
use tracing::info;

use crate::UpgradeArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UpgradePlan {
    pub(crate) release: String,
    pub(crate) chart: PathBuf,
    pub(crate) namespace: String,
    pub(crate) cluster_name: String,
    pub(crate) resource_group: String,
    pub(crate) subscription: String,
    pub(crate) values: Vec<PathBuf>,
    pub(crate) identity: bool,
    pub(crate) dry_run: bool,
    pub(crate) debug: bool,
}

impl UpgradePlan {
    pub(crate) fn new(settings: &Settings, args: &UpgradeArgs) -> Self {
        Self {
            release: args
                .hub_name
                .clone()
                .unwrap_or_else(|| settings.helm.release.clone()),
            chart: args
                .chart_name
                .clone()
                .unwrap_or_else(|| settings.helm.chart.clone()),
            // The hub name doubles as the namespace unless one is given.
            namespace: args
                .namespace
                .clone()
                .or_else(|| args.hub_name.clone())
                .unwrap_or_else(|| settings.cluster.namespace.clone()),
            cluster_name: args
                .cluster_name
                .clone()
                .unwrap_or_else(|| settings.cluster.name.clone()),
            resource_group: args
                .resource_group
                .clone()
                .unwrap_or_else(|| settings.azure.resource_group.clone()),
            subscription: args
                .subscription
                .clone()
                .unwrap_or_else(|| settings.azure.subscription.clone()),
            values: settings.helm_values(),
            identity: args.identity,
            dry_run: args.dry_run,
            debug: args.debug,
        }
    }
}

pub(crate) async fn run_upgrade(settings: &Settings, args: &UpgradeArgs) -> Result<()> {
    let plan = UpgradePlan::new(settings, args);
    let timeout = settings.tool_timeout()?;
    let az = Tool::new(&settings.tools.az, timeout);
    let helm = Tool::new(&settings.tools.helm, timeout);
    let kubectl = Tool::new(&settings.tools.kubectl, timeout);

    if plan.dry_run {
        info!("THIS IS A DRY-RUN. HELM CHART WILL NOT BE UPGRADED.");
    }
    ensure_values_present(&plan.values)?;

    login(&az, &plan).await?;
    update_local_chart(&helm, &plan.chart).await?;

    match (plan.dry_run, plan.debug) {
        (true, true) => info!("Performing a dry-run helm upgrade with debugging output"),
        (true, false) => info!("Performing a dry-run helm upgrade"),
        (false, true) => info!("Performing a helm upgrade with debugging output"),
        (false, false) => info!("Upgrading helm chart"),
    }
    let output = helm.run(&helm_upgrade_args(&plan), "helm upgrade").await?;
    log_output(&output);

    info!("Fetching the Kubernetes pods");
    let pods = kubectl
        .run(&get_pods_args(&plan.namespace), "kubectl get pods")
        .await?;
    log_output(&pods);
    print!("{pods}");
    Ok(())
}

fn ensure_values_present(values: &[PathBuf]) -> Result<()> {
    for path in values {
        if !path.is_file() {
            anyhow::bail!(
                "Values file {} not found; run `hubops materialize` first",
                path.display()
            );
        }
    }
    Ok(())
}

async fn login(az: &Tool, plan: &UpgradePlan) -> Result<()> {
    if plan.identity {
        info!("Logging into Azure with a Managed System Identity");
    } else {
        info!("Logging into Azure");
    }
    az.run(&login_args(plan.identity), "az login").await?;
    info!("Successfully logged into Azure");

    info!("Setting Azure subscription: {}", plan.subscription);
    az.run(&account_set_args(&plan.subscription), "az account set")
        .await?;
    info!("Successfully set Azure subscription: {}", plan.subscription);

    info!("Setting kubectl context for: {}", plan.cluster_name);
    let output = az
        .run(
            &get_credentials_args(&plan.cluster_name, &plan.resource_group),
            "az aks get-credentials",
        )
        .await?;
    log_output(&output);
    Ok(())
}

async fn update_local_chart(helm: &Tool, chart: &Path) -> Result<()> {
    info!("Updating local chart dependencies: {}", chart.display());
    let output = helm
        .clone()
        .in_dir(chart)
        .run(&["dependency", "update"], "helm dependency update")
        .await?;
    log_output(&output);
    Ok(())
}

fn log_output(output: &str) {
    let trimmed = output.trim();
    if !trimmed.is_empty() {
        info!("{trimmed}");
    }
}

fn login_args(identity: bool) -> Vec<String> {
    let mut args = vec!["login".to_string()];
    if identity {
        args.push("--identity".to_string());
    }
    args
}

// Arguments go straight to argv, so names with spaces need no quoting.
fn account_set_args(subscription: &str) -> Vec<String> {
    vec![
        "account".to_string(),
        "set".to_string(),
        "--subscription".to_string(),
        subscription.to_string(),
    ]
}

fn get_credentials_args(cluster_name: &str, resource_group: &str) -> Vec<String> {
    vec![
        "aks".to_string(),
        "get-credentials".to_string(),
        "--name".to_string(),
        cluster_name.to_string(),
        "--resource-group".to_string(),
        resource_group.to_string(),
        "--overwrite-existing".to_string(),
    ]
}

fn helm_upgrade_args(plan: &UpgradePlan) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        plan.release.clone(),
        plan.chart.to_string_lossy().to_string(),
        "--namespace".to_string(),
        plan.namespace.clone(),
    ];
    for values in &plan.values {
        args.push("-f".to_string());
        args.push(values.to_string_lossy().to_string());
    }
    args.push("--wait".to_string());
    if plan.dry_run {
        args.push("--dry-run".to_string());
    }
    if plan.debug {
        args.push("--debug".to_string());
    }
    args
}

fn get_pods_args(namespace: &str) -> Vec<String> {
    vec![
        "get".to_string(),
        "pods".to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> UpgradePlan {
        UpgradePlan {
            release: "hub23".to_string(),
            chart: PathBuf::from("hub23-chart"),
            namespace: "hub23".to_string(),
            cluster_name: "hub23cluster".to_string(),
            resource_group: "Hub23".to_string(),
            subscription: "Turing-BinderHub".to_string(),
            values: vec![
                PathBuf::from(".secret/secret.yaml"),
                PathBuf::from(".secret/config.yaml"),
            ],
            identity: false,
            dry_run: false,
            debug: false,
        }
    }

    fn upgrade_args(hub_name: Option<&str>, namespace: Option<&str>) -> UpgradeArgs {
        UpgradeArgs {
            hub_name: hub_name.map(str::to_string),
            chart_name: None,
            namespace: namespace.map(str::to_string),
            cluster_name: None,
            resource_group: None,
            subscription: None,
            identity: false,
            dry_run: false,
            debug: false,
        }
    }

    fn default_settings() -> Settings {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubops.toml");
        std::fs::write(&path, "").unwrap();
        Settings::new(Some(&path)).unwrap()
    }

    #[test]
    fn test_hub_name_sets_release_and_namespace() {
        let plan = UpgradePlan::new(&default_settings(), &upgrade_args(Some("hub24"), None));

        assert_eq!(plan.release, "hub24");
        assert_eq!(plan.namespace, "hub24");
        assert_eq!(
            get_pods_args(&plan.namespace),
            vec!["get", "pods", "--namespace", "hub24"]
        );
    }

    #[test]
    fn test_explicit_namespace_wins_over_hub_name() {
        let plan = UpgradePlan::new(
            &default_settings(),
            &upgrade_args(Some("hub24"), Some("binder")),
        );

        assert_eq!(plan.release, "hub24");
        assert_eq!(plan.namespace, "binder");
    }

    #[test]
    fn test_plan_defaults_from_settings() {
        let plan = UpgradePlan::new(&default_settings(), &upgrade_args(None, None));

        assert_eq!(plan.release, "hub23");
        assert_eq!(plan.namespace, "hub23");
        assert_eq!(plan.chart, PathBuf::from("hub23-chart"));
    }

    #[test]
    fn test_login_args() {
        assert_eq!(login_args(false), vec!["login"]);
        assert_eq!(login_args(true), vec!["login", "--identity"]);
    }

    #[test]
    fn test_account_set_keeps_spaces_in_one_arg() {
        assert_eq!(
            account_set_args("My Subscription"),
            vec!["account", "set", "--subscription", "My Subscription"]
        );
    }

    #[test]
    fn test_get_credentials_args() {
        assert_eq!(
            get_credentials_args("hub23cluster", "Hub23"),
            vec![
                "aks",
                "get-credentials",
                "--name",
                "hub23cluster",
                "--resource-group",
                "Hub23",
                "--overwrite-existing"
            ]
        );
    }

    #[test]
    fn test_helm_upgrade_args_plain() {
        assert_eq!(
            helm_upgrade_args(&plan()),
            vec![
                "upgrade",
                "hub23",
                "hub23-chart",
                "--namespace",
                "hub23",
                "-f",
                ".secret/secret.yaml",
                "-f",
                ".secret/config.yaml",
                "--wait"
            ]
        );
    }

    #[test]
    fn test_helm_upgrade_args_dry_run_debug() {
        let mut plan = plan();
        plan.dry_run = true;
        plan.debug = true;
        let args = helm_upgrade_args(&plan);
        assert_eq!(args[args.len() - 3..], ["--wait", "--dry-run", "--debug"]);
    }

    #[test]
    fn test_get_pods_args() {
        assert_eq!(
            get_pods_args("hub23"),
            vec!["get", "pods", "--namespace", "hub23"]
        );
    }

    #[test]
    fn test_ensure_values_present_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("secret.yaml");
        std::fs::write(&present, "a: b\n").unwrap();
        ensure_values_present(std::slice::from_ref(&present)).unwrap();

        let missing = dir.path().join("config.yaml");
        let err = ensure_values_present(&[present, missing]).unwrap_err();
        assert!(err.to_string().contains("hubops materialize"));
    }
}
