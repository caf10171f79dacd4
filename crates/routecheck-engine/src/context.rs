//! Per-scenario context
//!
//! Everything a scenario would otherwise read from process-wide state lives
//! here and is passed explicitly, so scenarios can run in parallel processes
//! (or tasks) without sharing anything but the cluster.

use std::path::{Path, PathBuf};

use rand::Rng;
use routecheck_common::{EngineConfig, Error, Result};

use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::poll::{PollConfig, Poller};
use crate::sample::SampleConfig;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 5;

/// Namespace, credentials and tunables for one scenario
#[derive(Debug, Clone)]
pub struct TestContext {
    namespace: String,
    kubeconfig: Option<PathBuf>,
    run_id: String,
    config: EngineConfig,
}

impl TestContext {
    /// Context for `namespace` with the given configuration.
    ///
    /// The run id comes from the configuration or is generated.
    pub fn new(namespace: impl Into<String>, config: EngineConfig) -> Self {
        let run_id = config.run_id.clone().unwrap_or_else(|| random_suffix(8));
        Self {
            namespace: namespace.into(),
            kubeconfig: config.cluster.kubeconfig.clone(),
            run_id,
            config,
        }
    }

    /// Context from configuration; `[cluster] namespace` must be set
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let namespace = config
            .cluster
            .namespace
            .clone()
            .ok_or_else(|| {
                Error::config("cluster.namespace is required (or set ROUTECHECK_NAMESPACE)")
            })?;
        Ok(Self::new(namespace, config))
    }

    /// Namespace scenario resources are created in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Kubeconfig path, if one was configured
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    /// Identifier stamped on every resource this scenario creates
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Full configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Poller with the configured cadence and deadline
    pub fn poller(&self) -> Poller {
        Poller::with_config(PollConfig::from(&self.config.poll))
    }

    /// Sampler defaults from configuration
    pub fn sample_config(&self) -> SampleConfig {
        SampleConfig::from(&self.config.sampler)
    }

    /// Tolerance for weighted distribution assertions
    pub fn tolerance(&self) -> f64 {
        self.config.sampler.tolerance
    }

    /// `prefix-xxxxx` with a random lowercase suffix, valid as a DNS label
    pub fn unique_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", random_suffix(SUFFIX_LEN))
    }

    /// A descriptor in this context's namespace
    pub fn descriptor(
        &self,
        kind: ResourceKind,
        name: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> ResourceDescriptor {
        ResourceDescriptor::new(kind, name, self.namespace.clone(), template)
    }
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}
