use std::collections::BTreeMap;
use std::path::PathBuf;

use config::{ConfigBuilder, ConfigError, builder::DefaultState};

use super::{PlaceholderSource, TemplateSettings};

pub const DEFAULT_CONFIG_FILE: &str = "hubops.toml";

const DEFAULT_SUBSCRIPTION: &str = "Turing-BinderHub";
const DEFAULT_RESOURCE_GROUP: &str = "Hub23";
const DEFAULT_VAULT_NAME: &str = "hub23-keyvault";
const DEFAULT_CLUSTER_NAME: &str = "hub23cluster";
const DEFAULT_NAMESPACE: &str = "hub23";
const DEFAULT_STATUS_SERVICE: &str = "proxy-public";
const DEFAULT_HELM_RELEASE: &str = "hub23";
const DEFAULT_HELM_CHART: &str = "hub23-chart";
const DEFAULT_OUTPUT_DIR: &str = ".secret";
const DEFAULT_TOOL_TIMEOUT: &str = "5m";
const DEFAULT_TERRAFORM_DIR: &str = "terraform";
const DEFAULT_INFRA_TIMEOUT: &str = "60m";
const DEFAULT_SP_APP_ID_SECRET: &str = "SP-appID";
const DEFAULT_SP_APP_KEY_SECRET: &str = "SP-key";
const DEFAULT_SSH_PUBLIC_KEY_SECRET: &str = "ssh-public-key";

const SECRET_TEMPLATE: &str = "deploy/secret-template.yaml";
const SECRET_OUTPUT: &str = "secret.yaml";
const CONFIG_TEMPLATE: &str = "deploy/config-template.yaml";
const CONFIG_OUTPUT: &str = "config.yaml";

pub(crate) fn apply_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("azure.subscription", DEFAULT_SUBSCRIPTION)?
        .set_default("azure.resource_group", DEFAULT_RESOURCE_GROUP)?
        .set_default("azure.vault_name", DEFAULT_VAULT_NAME)?
        .set_default("cluster.name", DEFAULT_CLUSTER_NAME)?
        .set_default("cluster.namespace", DEFAULT_NAMESPACE)?
        .set_default("cluster.status_service", DEFAULT_STATUS_SERVICE)?
        .set_default("helm.release", DEFAULT_HELM_RELEASE)?
        .set_default("helm.chart", DEFAULT_HELM_CHART)?
        .set_default("tools.az", "az")?
        .set_default("tools.kubectl", "kubectl")?
        .set_default("tools.helm", "helm")?
        .set_default("tools.terraform", "terraform")?
        .set_default("tools.timeout", DEFAULT_TOOL_TIMEOUT)?
        .set_default("infra.terraform_dir", DEFAULT_TERRAFORM_DIR)?
        .set_default("infra.timeout", DEFAULT_INFRA_TIMEOUT)?
        .set_default("infra.sp_app_id_secret", DEFAULT_SP_APP_ID_SECRET)?
        .set_default("infra.sp_app_key_secret", DEFAULT_SP_APP_KEY_SECRET)?
        .set_default("infra.ssh_public_key_secret", DEFAULT_SSH_PUBLIC_KEY_SECRET)?
        .set_default("output_dir", DEFAULT_OUTPUT_DIR)
}

pub(crate) fn default_templates() -> Vec<TemplateSettings> {
    vec![
        TemplateSettings {
            template: PathBuf::from(SECRET_TEMPLATE),
            output: SECRET_OUTPUT.to_string(),
        },
        TemplateSettings {
            template: PathBuf::from(CONFIG_TEMPLATE),
            output: CONFIG_OUTPUT.to_string(),
        },
    ]
}

pub(crate) fn default_placeholders() -> BTreeMap<String, PlaceholderSource> {
    let secret = |name: &str| PlaceholderSource::Secret(name.to_string());
    BTreeMap::from([
        ("api-token".to_string(), secret("apiToken")),
        ("secret-token".to_string(), secret("secretToken")),
        ("sp-app-id".to_string(), secret(DEFAULT_SP_APP_ID_SECRET)),
        ("sp-app-key".to_string(), secret(DEFAULT_SP_APP_KEY_SECRET)),
        (
            "github-client-id".to_string(),
            secret("github-client-id"),
        ),
        (
            "github-client-secret".to_string(),
            secret("github-client-secret"),
        ),
        (
            "jupyterhub-ip".to_string(),
            PlaceholderSource::Service(DEFAULT_STATUS_SERVICE.to_string()),
        ),
    ])
}
