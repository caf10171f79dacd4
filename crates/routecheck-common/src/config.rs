//! Engine configuration
//!
//! Loaded from TOML, then overridden by environment variables. Resolution
//! order for the file: explicit path, then `ROUTECHECK_CONFIG`, then built-in
//! defaults. Every section is optional.
//!
//! ```toml
//! [poll]
//! interval_ms = 2000
//! timeout_secs = 300
//!
//! [sampler]
//! attempts = 10
//! delay_ms = 0
//! deadline_secs = 120
//! tolerance = 0.25
//!
//! [cluster]
//! namespace = "e2e-router"
//! kubeconfig = "/tmp/kubeconfig"
//!
//! [logging]
//! json = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::telemetry::LoggingConfig;
use crate::{Error, Result};

/// Path to the config file
pub const ENV_CONFIG: &str = "ROUTECHECK_CONFIG";
/// Overrides `[cluster] namespace`
pub const ENV_NAMESPACE: &str = "ROUTECHECK_NAMESPACE";
/// Overrides `[cluster] kubeconfig`
pub const ENV_KUBECONFIG: &str = "ROUTECHECK_KUBECONFIG";
/// Overrides `[poll] timeout_secs`
pub const ENV_POLL_TIMEOUT_SECS: &str = "ROUTECHECK_POLL_TIMEOUT_SECS";
/// Sets the run id stamped on created resources
pub const ENV_RUN_ID: &str = "ROUTECHECK_RUN_ID";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Condition Poller cadence and deadline
    pub poll: PollSettings,
    /// Traffic Sampler defaults
    pub sampler: SamplerSettings,
    /// Target cluster
    pub cluster: ClusterSettings,
    /// Log output
    pub logging: LoggingConfig,
    /// Run identifier; a random one is generated when unset
    pub run_id: Option<String>,
}

/// `[poll]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    /// Time between observations
    pub interval_ms: u64,
    /// Deadline for a single poll
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            timeout_secs: 300,
        }
    }
}

impl PollSettings {
    /// Interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[sampler]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerSettings {
    /// Requests per sample
    pub attempts: u32,
    /// Pause between requests
    pub delay_ms: u64,
    /// Hard deadline for one sample run
    pub deadline_secs: u64,
    /// Allowed relative deviation from the weighted share
    pub tolerance: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay_ms: 0,
            deadline_secs: 120,
            tolerance: 0.25,
        }
    }
}

impl SamplerSettings {
    /// Delay as a `Duration`
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Deadline as a `Duration`
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// `[cluster]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSettings {
    /// Namespace scenarios create resources in
    pub namespace: Option<String>,
    /// Kubeconfig path; falls back to the kube client's own discovery
    pub kubeconfig: Option<PathBuf>,
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Resolve, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => {
                debug!(path = %p.display(), "loading engine config");
                Self::from_file(&p)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(ns) = lookup(ENV_NAMESPACE) {
            self.cluster.namespace = Some(ns);
        }
        if let Some(path) = lookup(ENV_KUBECONFIG) {
            self.cluster.kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(secs) = lookup(ENV_POLL_TIMEOUT_SECS) {
            self.poll.timeout_secs = secs.trim().parse().map_err(|_| {
                Error::config(format!("{ENV_POLL_TIMEOUT_SECS} must be an integer, got {secs:?}"))
            })?;
        }
        if let Some(id) = lookup(ENV_RUN_ID) {
            self.run_id = Some(id);
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ms == 0 {
            return Err(Error::config("poll.interval_ms must be > 0"));
        }
        if self.poll.timeout_secs == 0 {
            return Err(Error::config("poll.timeout_secs must be > 0"));
        }
        if self.sampler.attempts == 0 {
            return Err(Error::config("sampler.attempts must be >= 1"));
        }
        if self.sampler.deadline_secs == 0 {
            return Err(Error::config("sampler.deadline_secs must be > 0"));
        }
        let tolerance = self.sampler.tolerance;
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(Error::config(format!(
                "sampler.tolerance must be in (0, 1), got {tolerance}"
            )));
        }
        Ok(())
    }
}
