use std::collections::BTreeSet;

use anyhow::Result;

use super::{PlaceholderSource, Settings};
use crate::template::is_placeholder_name;

pub(crate) fn validate_settings(settings: &Settings) -> Result<()> {
    require_non_empty(&settings.azure.subscription, "azure.subscription")?;
    require_non_empty(&settings.azure.resource_group, "azure.resource_group")?;
    require_non_empty(&settings.azure.vault_name, "azure.vault_name")?;
    require_non_empty(&settings.cluster.name, "cluster.name")?;
    require_non_empty(&settings.cluster.namespace, "cluster.namespace")?;
    require_non_empty(&settings.cluster.status_service, "cluster.status_service")?;
    require_non_empty(&settings.helm.release, "helm.release")?;
    if settings.helm.chart.as_os_str().is_empty() {
        anyhow::bail!("helm.chart must not be empty");
    }
    if settings.output_dir.as_os_str().is_empty() {
        anyhow::bail!("output_dir must not be empty");
    }
    let timeout = settings.tool_timeout()?;
    if timeout.is_zero() {
        anyhow::bail!("tools.timeout must be greater than 0");
    }
    if settings.infra.terraform_dir.as_os_str().is_empty() {
        anyhow::bail!("infra.terraform_dir must not be empty");
    }
    if settings.infra_timeout()?.is_zero() {
        anyhow::bail!("infra.timeout must be greater than 0");
    }
    require_non_empty(&settings.infra.sp_app_id_secret, "infra.sp_app_id_secret")?;
    require_non_empty(&settings.infra.sp_app_key_secret, "infra.sp_app_key_secret")?;
    require_non_empty(
        &settings.infra.ssh_public_key_secret,
        "infra.ssh_public_key_secret",
    )?;
    validate_templates(settings)?;
    validate_placeholders(settings)?;
    Ok(())
}

fn validate_templates(settings: &Settings) -> Result<()> {
    if settings.templates.is_empty() {
        anyhow::bail!("templates must not be empty");
    }
    let mut outputs = BTreeSet::new();
    for template in &settings.templates {
        if template.template.as_os_str().is_empty() {
            anyhow::bail!("templates.template must not be empty");
        }
        let output = template.output.as_str();
        if output.trim().is_empty() {
            anyhow::bail!("templates.output must not be empty");
        }
        if output.trim() != output {
            anyhow::bail!("templates.output has surrounding whitespace: {output:?}");
        }
        // Outputs are file names inside output_dir, never paths out of it.
        if output.contains('/') || output.contains('\\') || output == "." || output == ".." {
            anyhow::bail!("templates.output must be a plain file name: {output}");
        }
        if !outputs.insert(output) {
            anyhow::bail!("templates.output is duplicated: {output}");
        }
    }
    Ok(())
}

fn validate_placeholders(settings: &Settings) -> Result<()> {
    for (name, source) in &settings.placeholders {
        if !is_placeholder_name(name) {
            anyhow::bail!("placeholders key is not a valid placeholder name: {name}");
        }
        match source {
            PlaceholderSource::Secret(secret) => {
                require_non_empty(secret, &format!("placeholders.{name}.secret"))?;
            }
            PlaceholderSource::Service(service) => {
                require_non_empty(service, &format!("placeholders.{name}.service"))?;
            }
            PlaceholderSource::Literal(_) => {}
        }
    }
    Ok(())
}

fn require_non_empty(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{label} must not be empty");
    }
    Ok(())
}
