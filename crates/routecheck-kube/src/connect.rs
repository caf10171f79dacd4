//! kube client construction

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use routecheck_common::retry::{retry_transient, RetryConfig};
use routecheck_common::{Error, Result};
use tracing::{debug, info};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from an optional kubeconfig path with custom timeouts
///
/// Without a path the configuration is inferred (`KUBECONFIG`, then
/// in-cluster service account).
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let mut config = load_config(kubeconfig).await?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| Error::config(format!("failed to create client: {}", e)))
}

async fn load_config(kubeconfig: Option<&Path>) -> Result<Config> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer config: {}", e))),
    }
}

/// Create a client and confirm the API server answers
///
/// Connection failures are retried with backoff; a malformed kubeconfig
/// fails on the first attempt.
pub async fn connect(kubeconfig: Option<&Path>, retry: &RetryConfig) -> Result<Client> {
    let client = create_client(kubeconfig).await?;
    let version = retry_transient(retry, "apiserver_version", || {
        let client = client.clone();
        async move {
            client
                .apiserver_version()
                .await
                .map_err(|e| Error::transient("apiserver_version", e.to_string()))
        }
    })
    .await?;
    debug!(platform = %version.platform, "API server reachable");
    info!(version = %version.git_version, "Connected to cluster");
    Ok(client)
}
