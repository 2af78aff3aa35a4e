//! In-memory collaborators for poll loop tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use rxwatch_core::clock::Clock;
use rxwatch_core::notify::Notifier;
use rxwatch_core::schema::{FieldKind, FieldSpec, ListGroup, MonitorSchema};
use rxwatch_core::snapshot::{split_items, RecordSnapshot, Snapshot};
use rxwatch_core::source::SnapshotSource;
use rxwatch_core::store::StateStore;
use rxwatch_core::types::Timestamp;
use rxwatch_worker::poll::Sleeper;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(pub String);

pub fn schema() -> MonitorSchema {
    MonitorSchema::new(
        "score_view",
        "encounter_id",
        FieldSpec::new("score", "score", "Score").kind(FieldKind::Integer),
    )
    .with_field(FieldSpec::new("patient", "patient", "Patient"))
    .with_group(ListGroup::new("meds", "meds", "Medications").count("meds_count", "meds_count"))
}

pub fn record(score: i64, meds: &str) -> RecordSnapshot {
    RecordSnapshot::new()
        .with("patient", "Jane Doe")
        .with("score", score)
        .with("meds_count", split_items(meds).len() as i64)
        .with("meds", meds)
}

pub fn snapshot(entries: &[(&str, RecordSnapshot)]) -> Snapshot {
    entries
        .iter()
        .map(|(id, record)| (id.to_string(), record.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeSource {
    queue: Arc<Mutex<VecDeque<Result<Snapshot, FakeError>>>>,
    fetches: Arc<Mutex<usize>>,
}

impl FakeSource {
    pub fn push_ok(&self, snapshot: Snapshot) {
        self.queue.lock().unwrap().push_back(Ok(snapshot));
    }

    pub fn push_err(&self, message: &str) {
        self.queue
            .lock()
            .unwrap()
            .push_back(Err(FakeError(message.to_string())));
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotSource for FakeSource {
    type Error = FakeError;

    async fn fetch(&self) -> Result<Snapshot, FakeError> {
        *self.fetches.lock().unwrap() += 1;
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FakeError("source exhausted".into())))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Option<Snapshot>>>,
    saves: Arc<Mutex<usize>>,
    failing: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn preload(&self, snapshot: Snapshot) {
        *self.saved.lock().unwrap() = Some(snapshot);
    }

    pub fn saved(&self) -> Option<Snapshot> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    type Error = FakeError;

    async fn load(&self) -> Result<Snapshot, FakeError> {
        if *self.failing.lock().unwrap() {
            return Err(FakeError("state unreadable".into()));
        }
        Ok(self.saved().unwrap_or_default())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), FakeError> {
        if *self.failing.lock().unwrap() {
            return Err(FakeError("disk full".into()));
        }
        *self.saved.lock().unwrap() = Some(snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    type Error = FakeError;

    async fn send(&self, text: &str) -> Result<(), FakeError> {
        if *self.failing.lock().unwrap() {
            return Err(FakeError("HTTP 502".into()));
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clock / sleeper
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Arc::new(Mutex::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            )),
        }
    }
}

impl ManualClock {
    pub fn advance_minutes(&self, minutes: i64) {
        *self.now.lock().unwrap() += chrono::Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

/// Records requested delays and cancels the loop after a fixed number.
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    limit: usize,
    cancel: CancellationToken,
}

impl RecordingSleeper {
    pub fn cancel_after(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            limit,
            cancel,
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let mut delays = self.delays.lock().unwrap();
        delays.push(duration);
        if delays.len() >= self.limit {
            self.cancel.cancel();
        }
    }
}
