//! kube-rs collaborators for the routecheck engine
//!
//! The engine talks to a cluster only through the `ClusterClient` and
//! `RemoteExec` traits. This crate implements both over a real API server:
//!
//! - [`KubeCluster`]: get, create, patch and delete of dynamically typed objects
//! - [`KubeExec`]: command execution and log reads inside pods
//! - [`errors::classify`]: kube errors mapped onto the engine's error classes
//!
//! ```ignore
//! let ctx = TestContext::from_config(EngineConfig::load(None)?)?;
//! let (cluster, exec) = routecheck_kube::connect_context(&ctx).await?;
//! ```

#![deny(missing_docs)]

pub mod client;
pub mod connect;
pub mod errors;
pub mod exec;
pub mod resource;

pub use client::KubeCluster;
pub use connect::{connect, create_client, create_client_with_timeout};
pub use exec::KubeExec;

use routecheck_common::retry::RetryConfig;
use routecheck_common::Result;
use routecheck_engine::TestContext;

/// Connect using the context's kubeconfig and build both collaborators
pub async fn connect_context(ctx: &TestContext) -> Result<(KubeCluster, KubeExec)> {
    let client = connect(ctx.kubeconfig(), &RetryConfig::default()).await?;
    Ok((KubeCluster::new(client.clone()), KubeExec::new(client)))
}
