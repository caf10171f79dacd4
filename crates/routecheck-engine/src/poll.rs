//! Condition Poller
//!
//! Re-observes cluster state until an expectation holds or a deadline passes.
//! Every variant funnels into [`Poller::until`] so they share one loop:
//!
//! - the first observation happens immediately
//! - observation errors never abort the loop; they are recorded as the last
//!   observation and the loop carries on
//! - the sleep between attempts is `min(interval, remaining)`, and each
//!   observation is cut off at the deadline, so a poll that never matches
//!   fails at the deadline
//! - on expiry the error carries the last observed value

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use routecheck_common::config::PollSettings;
use routecheck_common::{Error, Result};

use crate::client::{ClusterClient, FieldPath, ObjectRef};
use crate::matcher::Matcher;

/// Outcome of one observation
#[derive(Debug, Clone, PartialEq)]
pub enum Check<T> {
    /// The expectation holds; the loop returns `T`
    Done(T),
    /// Not yet; the string is what was observed
    Pending(String),
}

/// Cadence and deadline for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between observations
    pub interval: Duration,
    /// Deadline measured from the first observation
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig::from(&PollSettings::default())
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: settings.interval(),
            timeout: settings.timeout(),
        }
    }
}

/// Condition Poller bound to a [`PollConfig`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Poller {
    config: PollConfig,
}

impl Poller {
    /// Create a poller
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            config: PollConfig { interval, timeout },
        }
    }

    /// Create a poller from settings
    pub fn with_config(config: PollConfig) -> Self {
        Self { config }
    }

    /// A copy of this poller with a different deadline
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            config: PollConfig {
                timeout,
                ..self.config
            },
        }
    }

    /// The active cadence and deadline
    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// General form: run `check` until it reports [`Check::Done`].
    ///
    /// `expected` describes the expectation for the deadline error.
    pub async fn until<T, F, Fut>(
        &self,
        description: &str,
        expected: &str,
        mut check: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Check<T>>>,
    {
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut attempts = 0u32;
        let mut last_observed: Option<String> = None;

        loop {
            attempts += 1;
            // A hung observation must not outlive the deadline
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, check()).await {
                Ok(Ok(Check::Done(value))) => {
                    info!(
                        description = %description,
                        attempt = attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "condition met"
                    );
                    return Ok(value);
                }
                Ok(Ok(Check::Pending(observed))) => {
                    debug!(
                        description = %description,
                        attempt = attempts,
                        observed = %observed,
                        "condition not met yet"
                    );
                    last_observed = Some(observed);
                }
                Ok(Err(e)) => {
                    debug!(
                        description = %description,
                        attempt = attempts,
                        error = %e,
                        "observation failed, retrying"
                    );
                    last_observed = Some(e.to_string());
                }
                Err(_) => {
                    debug!(
                        description = %description,
                        attempt = attempts,
                        "observation still running at deadline"
                    );
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited = now - start;
                warn!(
                    description = %description,
                    attempts = attempts,
                    elapsed_ms = waited.as_millis() as u64,
                    "deadline exceeded"
                );
                return Err(Error::DeadlineExceeded {
                    description: description.to_string(),
                    expected: expected.to_string(),
                    last_observed,
                    waited,
                    attempts,
                });
            }
            tokio::time::sleep(self.config.interval.min(deadline - now)).await;
        }
    }

    /// Poll until `observe` returns a value accepted by `matcher`; returns it.
    pub async fn until_matches<F, Fut>(
        &self,
        description: &str,
        matcher: &Matcher,
        mut observe: F,
    ) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        self.until(description, &matcher.to_string(), || {
            let observation = observe();
            async move {
                let value = observation.await?;
                Ok(if matcher.matches(&value) {
                    Check::Done(value)
                } else {
                    Check::Pending(value)
                })
            }
        })
        .await
    }

    /// Poll until `observe` reports `Error::NotFound`.
    ///
    /// Any successful observation means the object still exists.
    pub async fn until_absent<T, F, Fut>(&self, description: &str, mut observe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.until(description, "not found", || {
            let observation = observe();
            async move {
                match observation.await {
                    Ok(_) => Ok(Check::Pending("still present".to_string())),
                    Err(e) if e.is_not_found() => Ok(Check::Done(())),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Like [`until_matches`](Self::until_matches) but an observation error
    /// is itself a candidate: `matcher` sees the output on success and the
    /// error message on failure. Returns whichever text matched.
    pub async fn until_output_or_error<F, Fut>(
        &self,
        description: &str,
        matcher: &Matcher,
        mut observe: F,
    ) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        self.until(description, &matcher.to_string(), || {
            let observation = observe();
            async move {
                let text = match observation.await {
                    Ok(out) => out,
                    Err(e) => e.message(),
                };
                Ok(if matcher.matches(&text) {
                    Check::Done(text)
                } else {
                    Check::Pending(text)
                })
            }
        })
        .await
    }

    /// Poll a single field of an object until it matches.
    pub async fn until_field_matches(
        &self,
        client: &dyn ClusterClient,
        target: &ObjectRef,
        path: &FieldPath,
        matcher: &Matcher,
    ) -> Result<String> {
        let description = format!("{target} {path}");
        self.until_matches(&description, matcher, || client.get_field(target, path))
            .await
    }

    /// Poll until a status condition reports `status` (`True`/`False`).
    pub async fn until_condition(
        &self,
        client: &dyn ClusterClient,
        target: &ObjectRef,
        condition_type: &str,
        status: &str,
    ) -> Result<()> {
        self.until_field_matches(
            client,
            target,
            &FieldPath::condition_status(condition_type),
            &Matcher::exact(status),
        )
        .await
        .map(|_| ())
    }
}
