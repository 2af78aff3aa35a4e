//! Per-record alert cooldown.
//!
//! Tracks when each record was last notified so repeated changes within
//! the window are not re-announced. State lives in memory only; a restart
//! re-arms every record.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::{RecordId, Timestamp};

/// Default minimum interval between two alerts for the same record.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Tracks the last delivered alert per record.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    window_minutes: i64,
    last_alert: HashMap<RecordId, Timestamp>,
}

impl CooldownTracker {
    /// Create an empty tracker. The window is truncated to whole minutes.
    pub fn new(window: Duration) -> Self {
        Self {
            window_minutes: i64::try_from(window.as_secs() / 60).unwrap_or(i64::MAX),
            last_alert: HashMap::new(),
        }
    }

    /// Window length in whole minutes.
    pub fn window_minutes(&self) -> i64 {
        self.window_minutes
    }

    /// `true` if `id` was never notified, or at least the window (in whole
    /// minutes) has elapsed since it was.
    pub fn may_notify(&self, id: &str, now: Timestamp) -> bool {
        match self.last_alert.get(id) {
            None => true,
            Some(last) => now.signed_duration_since(*last).num_minutes() >= self.window_minutes,
        }
    }

    /// Mark `id` as notified at `now`, replacing any earlier entry.
    pub fn record_notified(&mut self, id: &str, now: Timestamp) {
        self.last_alert.insert(id.to_string(), now);
    }

    /// Forget records whose window has elapsed at `now`. They would pass
    /// [`may_notify`](Self::may_notify) anyway. Returns the number removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let before = self.last_alert.len();
        let window = self.window_minutes;
        self.last_alert
            .retain(|_, last| now.signed_duration_since(*last).num_minutes() < window);
        before - self.last_alert.len()
    }

    pub fn last_notified(&self, id: &str) -> Option<Timestamp> {
        self.last_alert.get(id).copied()
    }

    /// Number of records currently tracked.
    pub fn len(&self) -> usize {
        self.last_alert.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_alert.is_empty()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
