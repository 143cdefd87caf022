use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::process::Tool;

/// External address of a `LoadBalancer` service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAddress {
    Assigned(String),
    /// The load balancer has not allocated an address yet.
    Pending,
}

impl ServiceAddress {
    pub fn assigned(&self) -> Option<&str> {
        match self {
            ServiceAddress::Assigned(address) => Some(address),
            ServiceAddress::Pending => None,
        }
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAddress::Assigned(address) => f.write_str(address),
            ServiceAddress::Pending => f.write_str("pending"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("service not found: {namespace}/{name}")]
    ServiceNotFound { namespace: String, name: String },
    #[error("cluster unreachable while querying service {name}: {message}")]
    Unreachable { name: String, message: String },
}

/// Read-only queries against the live cluster.
pub trait ClusterQuery {
    fn service_address(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ServiceAddress, ClusterError>> + Send;
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    kubectl: Tool,
    namespace: String,
}

impl Kubectl {
    pub fn new(kubectl: Tool, namespace: &str) -> Self {
        Self {
            kubectl,
            namespace: namespace.to_string(),
        }
    }
}

impl ClusterQuery for Kubectl {
    async fn service_address(&self, name: &str) -> Result<ServiceAddress, ClusterError> {
        let args = get_service_args(&self.namespace, name);
        let output = self
            .kubectl
            .output(&args)
            .await
            .map_err(|err| ClusterError::Unreachable {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        if !output.success() {
            if output.stderr.contains("NotFound") {
                return Err(ClusterError::ServiceNotFound {
                    namespace: self.namespace.clone(),
                    name: name.to_string(),
                });
            }
            return Err(ClusterError::Unreachable {
                name: name.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        let address = parse_service_address(&output.stdout).map_err(|err| {
            ClusterError::Unreachable {
                name: name.to_string(),
                message: format!("unexpected kubectl output: {err}"),
            }
        })?;
        debug!("Service {}/{name} address: {address}", self.namespace);
        Ok(address)
    }
}

fn get_service_args(namespace: &str, name: &str) -> Vec<String> {
    vec![
        "get".to_string(),
        "service".to_string(),
        name.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

#[derive(Debug, Deserialize, Default)]
struct ServiceObject {
    #[serde(default)]
    status: ServiceStatus,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceStatus {
    #[serde(default, rename = "loadBalancer")]
    load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Deserialize, Default)]
struct LoadBalancerStatus {
    #[serde(default)]
    ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Deserialize)]
struct LoadBalancerIngress {
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
}

fn parse_service_address(raw: &str) -> Result<ServiceAddress, serde_json::Error> {
    let service: ServiceObject = serde_json::from_str(raw)?;
    let address = service
        .status
        .load_balancer
        .ingress
        .into_iter()
        .find_map(|ingress| {
            ingress
                .ip
                .filter(|ip| !ip.trim().is_empty())
                .or(ingress.hostname.filter(|host| !host.trim().is_empty()))
        });
    Ok(address.map_or(ServiceAddress::Pending, ServiceAddress::Assigned))
}

/// Re-queries `name` every `interval` until an address is assigned or
/// `timeout` elapses. A timeout yields [`ServiceAddress::Pending`], not an error.
///
/// # Errors
/// Returns the first [`ClusterError`] from the query.
pub async fn wait_for_address<C: ClusterQuery>(
    cluster: &C,
    name: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<ServiceAddress, ClusterError> {
    let deadline = Instant::now() + timeout;
    loop {
        let address = cluster.service_address(name).await?;
        if address.assigned().is_some() {
            return Ok(address);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(address);
        }
        info!("Waiting for external address of service {name}");
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
