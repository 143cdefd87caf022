//! Renders the deployment's secret/config templates into the output directory.
//!
//! Every value is resolved before anything is written: a missing secret,
//! an unreachable cluster or an unknown placeholder leaves the previous
//! output files untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cluster::{ClusterQuery, ServiceAddress, wait_for_address};
use crate::config::{PlaceholderSource, Settings};
use crate::fs_util;
use crate::secrets::SecretStore;
use crate::template::{self, MaterializeError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// How long to wait for pending service addresses; zero queries once.
    pub wait: Duration,
    pub poll_interval: Duration,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            wait: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl MaterializeOptions {
    /// # Errors
    /// Returns an error if waiting is requested with a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        if !self.wait.is_zero() && self.poll_interval.is_zero() {
            anyhow::bail!("poll interval must be greater than 0 when waiting");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub template: PathBuf,
    pub output: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub written: Vec<PathBuf>,
    pub status_service: String,
    pub status_address: ServiceAddress,
}

struct LoadedTemplate {
    template: PathBuf,
    output: PathBuf,
    contents: String,
}

/// Resolves every placeholder, renders all templates and writes them.
///
/// # Errors
/// Returns an error on the first failure; no file is written unless every
/// template rendered.
pub async fn run<S, C>(
    settings: &Settings,
    secrets: &S,
    cluster: &C,
    options: &MaterializeOptions,
) -> Result<MaterializeReport>
where
    S: SecretStore,
    C: ClusterQuery,
{
    let (documents, addresses) = render(settings, secrets, cluster, options).await?;
    let status_service = settings.cluster.status_service.clone();
    let status_address = match addresses.get(&status_service) {
        Some(address) => address.clone(),
        None => resolve_address(cluster, &status_service, options)
            .await
            .with_context(|| {
                format!("Failed to query external address of service {status_service}")
            })?,
    };

    fs_util::ensure_output_dir(&settings.output_dir).await?;
    let mut written = Vec::with_capacity(documents.len());
    for document in documents {
        fs_util::write_private_file(&document.output, &document.contents).await?;
        info!(
            "Wrote {} from {}",
            document.output.display(),
            document.template.display()
        );
        written.push(document.output);
    }

    Ok(MaterializeReport {
        written,
        status_service,
        status_address,
    })
}

/// Renders every configured template in memory without writing anything.
///
/// # Errors
/// Returns an error if a template cannot be read, uses a placeholder with
/// no configured source, or a value cannot be resolved.
pub async fn render_all<S, C>(
    settings: &Settings,
    secrets: &S,
    cluster: &C,
    options: &MaterializeOptions,
) -> Result<Vec<RenderedDocument>>
where
    S: SecretStore,
    C: ClusterQuery,
{
    let (documents, _) = render(settings, secrets, cluster, options).await?;
    Ok(documents)
}

/// Renders every template and returns the service addresses resolved on the
/// way, keyed by service name.
async fn render<S, C>(
    settings: &Settings,
    secrets: &S,
    cluster: &C,
    options: &MaterializeOptions,
) -> Result<(Vec<RenderedDocument>, BTreeMap<String, ServiceAddress>)>
where
    S: SecretStore,
    C: ClusterQuery,
{
    options.validate()?;
    let loaded = load_templates(settings).await?;

    let malformed: BTreeSet<String> = loaded
        .iter()
        .flat_map(|template| template::malformed_placeholders(&template.contents))
        .collect();
    if !malformed.is_empty() {
        return Err(MaterializeError::Malformed(malformed.into_iter().collect()).into());
    }

    let used: BTreeSet<String> = loaded
        .iter()
        .flat_map(|template| template::placeholders(&template.contents))
        .collect();
    let unknown: Vec<String> = used
        .iter()
        .filter(|name| !settings.placeholders.contains_key(*name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(MaterializeError::UnknownPlaceholders(unknown).into());
    }

    let (values, addresses) = resolve_values(settings, &used, secrets, cluster, options).await?;

    let documents = loaded
        .into_iter()
        .map(|template| {
            let contents = template::materialize(&template.contents, &values)
                .and_then(|document| template::validate_yaml(&document).map(|()| document))
                .with_context(|| format!("Failed to render {}", template.template.display()))?;
            Ok(RenderedDocument {
                template: template.template,
                output: template.output,
                contents,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((documents, addresses))
}

async fn load_templates(settings: &Settings) -> Result<Vec<LoadedTemplate>> {
    let mut loaded = Vec::with_capacity(settings.templates.len());
    for entry in &settings.templates {
        let contents = tokio::fs::read_to_string(&entry.template)
            .await
            .with_context(|| format!("Failed to read template {}", entry.template.display()))?;
        loaded.push(LoadedTemplate {
            template: entry.template.clone(),
            output: settings.output_path(entry),
            contents,
        });
    }
    Ok(loaded)
}

async fn resolve_values<S, C>(
    settings: &Settings,
    used: &BTreeSet<String>,
    secrets: &S,
    cluster: &C,
    options: &MaterializeOptions,
) -> Result<(BTreeMap<String, String>, BTreeMap<String, ServiceAddress>)>
where
    S: SecretStore,
    C: ClusterQuery,
{
    // Several placeholders may share a secret or service; query each once per run.
    let mut secret_values = BTreeMap::new();
    let mut addresses = BTreeMap::new();
    let mut values = BTreeMap::new();

    for name in used {
        let Some(source) = settings.placeholders.get(name) else {
            continue;
        };
        let value = match source {
            PlaceholderSource::Secret(secret) => {
                if !secret_values.contains_key(secret) {
                    let value = secrets
                        .get(secret)
                        .await
                        .with_context(|| format!("Failed to resolve <{name}>"))?;
                    secret_values.insert(secret.clone(), value);
                }
                secret_values[secret].expose().to_string()
            }
            PlaceholderSource::Service(service) => {
                if !addresses.contains_key(service) {
                    let address = resolve_address(cluster, service, options)
                        .await
                        .with_context(|| format!("Failed to resolve <{name}>"))?;
                    addresses.insert(service.clone(), address);
                }
                match &addresses[service] {
                    ServiceAddress::Assigned(address) => address.clone(),
                    ServiceAddress::Pending => {
                        return Err(MaterializeError::PendingAddress {
                            placeholder: name.clone(),
                            service: service.clone(),
                        }
                        .into());
                    }
                }
            }
            PlaceholderSource::Literal(value) => value.clone(),
        };
        values.insert(name.clone(), value);
    }
    Ok((values, addresses))
}

async fn resolve_address<C: ClusterQuery>(
    cluster: &C,
    service: &str,
    options: &MaterializeOptions,
) -> Result<ServiceAddress> {
    let address = if options.wait.is_zero() {
        cluster.service_address(service).await?
    } else {
        wait_for_address(cluster, service, options.wait, options.poll_interval).await?
    };
    Ok(address)
}
