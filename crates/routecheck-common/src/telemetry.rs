//! Logging initialization
//!
//! Conformance runs log to stderr only: JSON lines when the run is collected
//! by CI, human-readable output when a developer runs a scenario locally.
//! `RUST_LOG` always wins over the configured filter.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Default filter directives when neither `RUST_LOG` nor config set one
pub const DEFAULT_FILTER: &str = "info,routecheck=debug,kube=info,tower=warn,hyper=warn";

/// `[logging]` section of the engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter directives used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

impl LoggingConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(self.filter.as_deref().unwrap_or(DEFAULT_FILTER))
        })
    }
}

/// Install the global tracing subscriber.
///
/// Fails with `Error::Config` if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| Error::config(format!("failed to initialize logging: {e}")))
}

/// Install a test-friendly subscriber; repeated calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("routecheck=debug")),
        )
        .with_test_writer()
        .try_init();
}
