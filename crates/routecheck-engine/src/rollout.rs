//! Rollout Generation Tracker
//!
//! Correlates a mutation with the workload's `metadata.generation`. Waits are
//! always for an exact absolute generation (baseline + delta), never for
//! "anything but the baseline", so an unrelated intermediate rollout cannot
//! satisfy them.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use routecheck_common::{Error, Result};

use crate::client::{ClusterClient, FieldPath, ObjectRef};
use crate::matcher::Matcher;
use crate::poll::Poller;

/// Wait until `workload` reports exactly generation `expected`
pub async fn expect_generation(
    poller: &Poller,
    client: &dyn ClusterClient,
    workload: &ObjectRef,
    expected: i64,
) -> Result<()> {
    poller
        .until_field_matches(
            client,
            workload,
            &FieldPath::generation(),
            &Matcher::exact(expected.to_string()),
        )
        .await
        .map(|_| ())
}

/// Read the current generation of `workload`
pub async fn read_generation(client: &dyn ClusterClient, workload: &ObjectRef) -> Result<i64> {
    let raw = client.get_field(workload, &FieldPath::generation()).await?;
    raw.parse().map_err(|_| {
        Error::assertion(format!("{workload} has no integer metadata.generation (got {raw:?})"))
    })
}

/// Baseline generation of one workload
pub struct GenerationTracker<'a> {
    client: &'a dyn ClusterClient,
    workload: ObjectRef,
    baseline: i64,
}

impl<'a> GenerationTracker<'a> {
    /// Capture the current generation as the baseline
    pub async fn capture(client: &'a dyn ClusterClient, workload: ObjectRef) -> Result<Self> {
        let baseline = read_generation(client, &workload).await?;
        debug!(workload = %workload, generation = baseline, "captured baseline generation");
        Ok(Self {
            client,
            workload,
            baseline,
        })
    }

    /// The tracked workload
    pub fn workload(&self) -> &ObjectRef {
        &self.workload
    }

    /// The current baseline
    pub fn baseline(&self) -> i64 {
        self.baseline
    }

    /// Wait for exactly `baseline + delta`; returns that generation
    pub async fn expect_advanced_by(&self, poller: &Poller, delta: i64) -> Result<i64> {
        let expected = self.baseline + delta;
        expect_generation(poller, self.client, &self.workload, expected).await?;
        info!(workload = %self.workload, generation = expected, "rollout observed");
        Ok(expected)
    }

    /// Re-read for `settle` and fail the moment generation leaves the baseline.
    ///
    /// Transient read failures are skipped; other errors propagate. A read
    /// still in flight when the window closes counts as no movement.
    pub async fn expect_unchanged(&self, settle: Duration, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::operation(
                "expect_unchanged",
                "settle interval must be > 0",
            ));
        }

        let deadline = Instant::now() + settle;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, read_generation(self.client, &self.workload))
                .await
            {
                Ok(Ok(generation)) if generation != self.baseline => {
                    return Err(Error::assertion(format!(
                        "{} generation moved from {} to {generation}; expected no rollout",
                        self.workload, self.baseline
                    )));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) if e.is_transient() => {
                    debug!(
                        workload = %self.workload,
                        error = %e,
                        "generation read failed, skipping"
                    );
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(workload = %self.workload, "generation read outlived settle window");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(
                    workload = %self.workload,
                    generation = self.baseline,
                    "generation unchanged"
                );
                return Ok(());
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// Move the baseline to the current generation; returns it
    pub async fn rebase(&mut self) -> Result<i64> {
        self.baseline = read_generation(self.client, &self.workload).await?;
        Ok(self.baseline)
    }
}
