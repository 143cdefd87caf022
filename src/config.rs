use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

mod defaults;
mod validation;

pub use defaults::DEFAULT_CONFIG_FILE;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub azure: AzureSettings,
    pub cluster: ClusterSettings,
    pub helm: HelmSettings,
    pub tools: ToolSettings,
    pub infra: InfraSettings,
    pub output_dir: PathBuf,
    #[serde(default = "defaults::default_templates")]
    pub templates: Vec<TemplateSettings>,
    #[serde(default = "defaults::default_placeholders")]
    pub placeholders: BTreeMap<String, PlaceholderSource>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AzureSettings {
    pub subscription: String,
    pub resource_group: String,
    pub vault_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusterSettings {
    pub name: String,
    pub namespace: String,
    /// Service whose external IP is reported after materialization.
    pub status_service: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HelmSettings {
    pub release: String,
    pub chart: PathBuf,
    /// Values files passed to `helm upgrade`; empty means the materialized outputs.
    #[serde(default)]
    pub values: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolSettings {
    pub az: PathBuf,
    pub kubectl: PathBuf,
    pub helm: PathBuf,
    pub terraform: PathBuf,
    pub timeout: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfraSettings {
    pub terraform_dir: PathBuf,
    /// Timeout for `terraform` runs, which outlast ordinary tool calls.
    pub timeout: String,
    pub sp_app_id_secret: String,
    pub sp_app_key_secret: String,
    pub ssh_public_key_secret: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    pub template: PathBuf,
    /// File name inside `output_dir`.
    pub output: String,
}

/// Where the value of a template placeholder comes from.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderSource {
    /// Key vault secret name.
    Secret(String),
    /// Kubernetes service whose external IP is substituted.
    Service(String),
    Literal(String),
}

impl Settings {
    /// Loads settings from defaults, an optional TOML file and `HUBOPS_*`
    /// environment variables, in that order of precedence.
    ///
    /// # Errors
    /// Returns error if configuration parsing fails (e.g. explicit file not found, invalid format).
    pub fn new(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, environment())
    }

    fn load(config_path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut s = defaults::apply_defaults(Config::builder())?;

        s = match config_path {
            Some(path) => s.add_source(File::from(path.to_path_buf()).required(true)),
            None => s.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false)),
        };

        s = s.add_source(env);

        s.build()?.try_deserialize()
    }

    /// Validates configuration values for correctness.
    ///
    /// # Errors
    /// Returns error if any setting is invalid.
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }

    /// Timeout applied to every external tool invocation.
    ///
    /// # Errors
    /// Returns error if `tools.timeout` is not a valid duration.
    pub fn tool_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.tools.timeout)
            .with_context(|| format!("Invalid tools.timeout: {}", self.tools.timeout))
    }

    /// Timeout applied to `terraform` invocations.
    ///
    /// # Errors
    /// Returns error if `infra.timeout` is not a valid duration.
    pub fn infra_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.infra.timeout)
            .with_context(|| format!("Invalid infra.timeout: {}", self.infra.timeout))
    }

    pub fn output_path(&self, template: &TemplateSettings) -> PathBuf {
        self.output_dir.join(&template.output)
    }

    /// Values files for `helm upgrade`.
    pub fn helm_values(&self) -> Vec<PathBuf> {
        if self.helm.values.is_empty() {
            self.templates
                .iter()
                .map(|template| self.output_path(template))
                .collect()
        } else {
            self.helm.values.clone()
        }
    }
}

// e.g. HUBOPS_AZURE__VAULT_NAME, HUBOPS_OUTPUT_DIR
fn environment() -> Environment {
    Environment::with_prefix("HUBOPS")
        .prefix_separator("_")
        .separator("__")
}
