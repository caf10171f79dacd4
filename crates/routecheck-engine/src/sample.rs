//! Traffic Sampler
//!
//! Runs an operation a fixed number of times and tallies each output into the
//! first matcher that accepts it. A miss is never an error: it lands in the
//! `unmatched` bucket and the caller asserts on the counts.
//!
//! Operation errors split two ways. `Error::Transient` (one request failed
//! for connectivity reasons) counts as unmatched and is tallied in
//! [`SampleCounts::errors`]; anything else means the operation cannot be
//! invoked at all and aborts the run.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use routecheck_common::config::SamplerSettings;
use routecheck_common::{Error, Result};

use crate::matcher::{first_match, Matcher};
use crate::poll::{Check, Poller};

/// Parameters of one sample run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleConfig {
    /// Number of operations; fixed up front
    pub attempts: u32,
    /// Pause between consecutive operations
    pub delay: Duration,
    /// Wall-clock limit for the whole run
    pub deadline: Duration,
}

impl SampleConfig {
    /// `attempts` operations with no delay and the default deadline
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            ..Self::from(&SamplerSettings::default())
        }
    }

    /// Pause between operations
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Wall-clock limit for the run
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

impl From<&SamplerSettings> for SampleConfig {
    fn from(settings: &SamplerSettings) -> Self {
        Self {
            attempts: settings.attempts,
            delay: settings.delay(),
            deadline: settings.deadline(),
        }
    }
}

/// Per-matcher tallies of one sample run
///
/// `counts.iter().sum() + unmatched == attempts` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCounts {
    labels: Vec<String>,
    counts: Vec<u32>,
    unmatched: u32,
    errors: u32,
    attempts: u32,
}

impl SampleCounts {
    fn new(matchers: &[Matcher], attempts: u32) -> Self {
        Self {
            labels: matchers.iter().map(|m| m.pattern().to_string()).collect(),
            counts: vec![0; matchers.len()],
            unmatched: 0,
            errors: 0,
            attempts,
        }
    }

    /// Count for matcher `index`; zero for an out-of-range index
    pub fn count(&self, index: usize) -> u32 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// All per-matcher counts in declaration order
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Attempts no matcher accepted, including transient failures
    pub fn unmatched(&self) -> u32 {
        self.unmatched
    }

    /// Attempts that failed transiently (a subset of `unmatched`)
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Total number of attempts
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Share of attempts that landed on matcher `index`, in `[0, 1]`
    pub fn ratio(&self, index: usize) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        f64::from(self.count(index)) / f64::from(self.attempts)
    }

    /// Every matcher saw at least one hit
    pub fn all_nonzero(&self) -> bool {
        !self.counts.is_empty() && self.counts.iter().all(|&c| c > 0)
    }

    /// Every attempt landed on matcher `index` (session stickiness)
    pub fn assert_all_in(&self, index: usize) -> Result<()> {
        if self.count(index) == self.attempts {
            return Ok(());
        }
        Err(Error::assertion(format!(
            "expected all {} attempts on {}, got {self}",
            self.attempts,
            self.label(index)
        )))
    }

    /// Counts follow `weights` proportionally within `tolerance`.
    ///
    /// With total weight `W` and `N` attempts, bucket `i` is expected to hold
    /// `N * w_i / W`. Every bucket with a non-zero weight must be non-empty and
    /// within `±tolerance` (relative) of its share; zero-weight buckets must be
    /// empty.
    pub fn assert_distribution(&self, weights: &[u32], tolerance: f64) -> Result<()> {
        if weights.len() != self.counts.len() {
            return Err(Error::assertion(format!(
                "{} weights given for {} matchers",
                weights.len(),
                self.counts.len()
            )));
        }
        let total: u32 = weights.iter().sum();
        if total == 0 {
            return Err(Error::assertion("weights sum to zero"));
        }

        let mut failures = Vec::new();
        for (index, &weight) in weights.iter().enumerate() {
            let got = f64::from(self.count(index));
            let expected = f64::from(self.attempts) * f64::from(weight) / f64::from(total);
            let ok = if weight == 0 {
                got == 0.0
            } else {
                got > 0.0 && (got - expected).abs() <= expected * tolerance
            };
            if !ok {
                failures.push(format!(
                    "{}: got {got}, expected {expected:.1} ±{:.0}%",
                    self.label(index),
                    tolerance * 100.0
                ));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::assertion(format!(
                "distribution off for weights {weights:?} ({self}): {}",
                failures.join("; ")
            )))
        }
    }

    fn label(&self, index: usize) -> &str {
        self.labels.get(index).map(String::as_str).unwrap_or("<none>")
    }
}

impl fmt::Display for SampleCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, count) in self.labels.iter().zip(&self.counts) {
            write!(f, "{label}={count} ")?;
        }
        write!(f, "unmatched={}", self.unmatched)?;
        if self.errors > 0 {
            write!(f, " (errors={})", self.errors)?;
        }
        Ok(())
    }
}

/// Run `operation` `config.attempts` times and classify each output.
pub async fn sample<F, Fut>(
    config: &SampleConfig,
    matchers: &[Matcher],
    mut operation: F,
) -> Result<SampleCounts>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    if config.attempts == 0 {
        return Err(Error::operation("sample", "attempts must be >= 1"));
    }

    let start = Instant::now();
    let deadline = start + config.deadline;
    let mut counts = SampleCounts::new(matchers, config.attempts);
    let mut last_output: Option<String> = None;

    let expired = |done: u32, last_output: Option<String>| {
        let waited = start.elapsed();
        warn!(
            attempt = done,
            elapsed_ms = waited.as_millis() as u64,
            "sample deadline exceeded"
        );
        Error::DeadlineExceeded {
            description: format!("sample of {} attempts", config.attempts),
            expected: format!("{} completed attempts", config.attempts),
            last_observed: last_output,
            waited,
            attempts: done,
        }
    };

    for attempt in 1..=config.attempts {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(expired(attempt - 1, last_output));
        }

        match tokio::time::timeout(remaining, operation()).await {
            Err(_) => return Err(expired(attempt - 1, last_output)),
            Ok(Ok(output)) => {
                match first_match(matchers, &output) {
                    Some(index) => counts.counts[index] += 1,
                    None => counts.unmatched += 1,
                }
                debug!(attempt = attempt, output = %output.trim(), "sample attempt");
                last_output = Some(output);
            }
            Ok(Err(e)) if e.is_transient() => {
                debug!(attempt = attempt, error = %e, "sample attempt failed transiently");
                counts.unmatched += 1;
                counts.errors += 1;
                last_output = Some(e.to_string());
            }
            Ok(Err(e)) => return Err(e),
        }

        if attempt < config.attempts && !config.delay.is_zero() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(config.delay.min(remaining)).await;
        }
    }

    info!(counts = %counts, "sample complete");
    Ok(counts)
}

/// Repeat fixed-size samples under `poller` until `predicate` accepts one.
///
/// Batches are independent; counts are never merged across them. Returns the
/// accepted batch.
pub async fn sample_until<F, Fut, P>(
    poller: &Poller,
    config: &SampleConfig,
    matchers: &[Matcher],
    operation: F,
    predicate: P,
) -> Result<SampleCounts>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String>>,
    P: Fn(&SampleCounts) -> bool,
{
    let description = format!("sample of {} attempts", config.attempts);
    let operation = &operation;
    let predicate = &predicate;

    poller
        .until(&description, "counts accepted by predicate", || async move {
            let counts = sample(config, matchers, operation).await?;
            Ok(if predicate(&counts) {
                Check::Done(counts)
            } else {
                Check::Pending(counts.to_string())
            })
        })
        .await
}
