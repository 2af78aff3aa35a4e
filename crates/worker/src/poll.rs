//! The monitoring loop.
//!
//! Each cycle moves through `Fetching → Comparing → Persisting`; any
//! failure short-circuits to `Failed`. After a completed cycle the loop
//! sleeps for the poll interval, after a failed one for the shorter retry
//! delay, and then starts over. Nothing is fatal: the loop is the single
//! catch-all boundary and only stops when its [`CancellationToken`] fires
//! between cycles.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rxwatch_core::clock::Clock;
use rxwatch_core::cooldown::{CooldownTracker, DEFAULT_COOLDOWN};
use rxwatch_core::diff::{self, Alert, DiffResult, FirstSightPolicy};
use rxwatch_core::notify::Notifier;
use rxwatch_core::render;
use rxwatch_core::schema::MonitorSchema;
use rxwatch_core::snapshot::Snapshot;
use rxwatch_core::source::SnapshotSource;
use rxwatch_core::store::StateStore;

/// Default delay between completed cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default delay after a failed cycle.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Settings / state / outcome types
// ---------------------------------------------------------------------------

/// Timing and policy knobs for [`PollLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub cooldown: Duration,
    pub first_sight: FirstSightPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            cooldown: DEFAULT_COOLDOWN,
            first_sight: FirstSightPolicy::default(),
        }
    }
}

/// Phase of a monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Fetching,
    Comparing,
    Persisting,
    Failed,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Comparing => "comparing",
            Self::Persisting => "persisting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cycle was abandoned.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The source could not produce a snapshot; previous state is untouched.
    #[error("Snapshot fetch failed: {0}")]
    Source(#[source] BoxError),

    /// The new snapshot could not be stored; in-memory state is untouched.
    #[error("Snapshot persist failed: {0}")]
    Persist(#[source] BoxError),
}

impl CycleError {
    /// The phase the cycle was in when it failed.
    pub fn state(&self) -> CycleState {
        match self {
            Self::Source(_) => CycleState::Fetching,
            Self::Persist(_) => CycleState::Persisting,
        }
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records in the fetched snapshot.
    pub records: usize,
    /// Records that produced an alert.
    pub changed: usize,
    /// New identifiers recorded silently.
    pub first_sightings: usize,
    /// Identifiers no longer returned by the source.
    pub departed: usize,
    pub sent: usize,
    /// Alerts withheld by the cooldown.
    pub suppressed: usize,
    /// Alerts whose delivery failed.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Delay between cycles, injectable so tests run without real time passing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// PollLoop
// ---------------------------------------------------------------------------

/// Owns the previous snapshot and the cooldown state; the only mutator of
/// either.
pub struct PollLoop<S, T, N, C> {
    source: S,
    store: T,
    notifier: N,
    clock: C,
    schema: MonitorSchema,
    settings: LoopSettings,
    previous: Snapshot,
    cooldown: CooldownTracker,
}

impl<S, T, N, C> PollLoop<S, T, N, C>
where
    S: SnapshotSource,
    T: StateStore,
    N: Notifier,
    C: Clock,
{
    /// Create a loop with an empty baseline. Call [`restore`](Self::restore)
    /// to load the stored one.
    pub fn new(
        source: S,
        store: T,
        notifier: N,
        clock: C,
        schema: MonitorSchema,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            clock,
            schema,
            cooldown: CooldownTracker::new(settings.cooldown),
            settings,
            previous: Snapshot::new(),
        }
    }

    /// Load the previous snapshot from the store.
    ///
    /// An unreadable store is logged and replaced by an empty baseline, so
    /// every record is a first sighting on the next cycle. Returns the
    /// number of records loaded.
    pub async fn restore(&mut self) -> usize {
        match self.store.load().await {
            Ok(snapshot) => self.previous = snapshot,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to load previous state, starting from an empty baseline"
                );
                self.previous = Snapshot::new();
            }
        }
        self.previous.len()
    }

    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run one fetch, compare-and-notify, persist cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        tracing::debug!(state = %CycleState::Fetching, "Fetching snapshot");
        let current = self
            .source
            .fetch()
            .await
            .map_err(|e| CycleError::Source(Box::new(e)))?;

        tracing::debug!(
            state = %CycleState::Comparing,
            records = current.len(),
            "Comparing snapshot"
        );
        let departed = diff::departed(&self.previous, &current);
        if !departed.is_empty() {
            tracing::debug!(ids = ?departed, "Records no longer present in source");
        }
        let mut report = CycleReport {
            records: current.len(),
            departed: departed.len(),
            ..CycleReport::default()
        };

        let results = diff::evaluate(
            &self.previous,
            &current,
            &self.schema,
            self.settings.first_sight,
        );
        for result in results.into_values() {
            match result {
                DiffResult::Unchanged => {}
                DiffResult::FirstSighting => report.first_sightings += 1,
                DiffResult::Changed(alert) => {
                    report.changed += 1;
                    self.dispatch(&alert, &mut report).await;
                }
            }
        }

        let expired = self.cooldown.prune(self.clock.now());
        if expired > 0 {
            tracing::debug!(
                expired,
                tracked = self.cooldown.len(),
                "Expired cooldown entries pruned"
            );
        }

        tracing::debug!(state = %CycleState::Persisting, "Persisting snapshot");
        self.store
            .save(&current)
            .await
            .map_err(|e| CycleError::Persist(Box::new(e)))?;
        self.previous = current;

        Ok(report)
    }

    /// Gate one alert on the cooldown, then render and deliver it. The
    /// cooldown is armed only when the notifier accepts the message.
    async fn dispatch(&mut self, alert: &Alert, report: &mut CycleReport) {
        let now = self.clock.now();

        if !self.cooldown.may_notify(&alert.id, now) {
            report.suppressed += 1;
            tracing::info!(
                record_id = %alert.id,
                last_notified = ?self.cooldown.last_notified(&alert.id),
                "Change within cooldown window, alert suppressed"
            );
            return;
        }

        let text = render::render_alert(&self.schema, alert, now);
        tracing::debug!(record_id = %alert.id, message = %text, "Rendered alert");

        match self.notifier.send(&text).await {
            Ok(()) => {
                self.cooldown.record_notified(&alert.id, now);
                report.sent += 1;
                tracing::info!(
                    record_id = %alert.id,
                    changed_groups = alert.changes.len(),
                    first_sighting = alert.first_sighting,
                    "Alert delivered"
                );
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(record_id = %alert.id, error = %e, "Alert delivery failed");
            }
        }
    }

    /// Delay before the next cycle.
    pub fn delay_after(&self, outcome: &Result<CycleReport, CycleError>) -> Duration {
        match outcome {
            Ok(_) => self.settings.poll_interval,
            Err(_) => self.settings.retry_delay,
        }
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Cancellation is observed only between cycles; an in-flight fetch,
    /// delivery or save always completes.
    pub async fn run<Z: Sleeper>(&mut self, sleeper: &Z, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            retry_delay_secs = self.settings.retry_delay.as_secs(),
            cooldown_minutes = self.cooldown.window_minutes(),
            baseline_records = self.previous.len(),
            "Poll loop started"
        );

        while !cancel.is_cancelled() {
            let outcome = self.run_cycle().await;
            match &outcome {
                Ok(report) => tracing::info!(
                    records = report.records,
                    changed = report.changed,
                    sent = report.sent,
                    suppressed = report.suppressed,
                    failed = report.failed,
                    first_sightings = report.first_sightings,
                    departed = report.departed,
                    "Monitoring cycle complete"
                ),
                Err(e) => tracing::error!(
                    state = %CycleState::Failed,
                    failed_in = %e.state(),
                    error = %e,
                    "Monitoring cycle failed"
                ),
            }

            let delay = self.delay_after(&outcome);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleeper.sleep(delay) => {}
            }
        }

        tracing::info!("Poll loop stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
