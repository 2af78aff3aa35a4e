//! Snapshot diff engine.
//!
//! Pure logic: the caller fetches both snapshots and decides what to do
//! with each [`DiffResult`]. Cooldown gating and delivery happen elsewhere.
//!
//! Two records are equivalent when every field matches. Scalars compare
//! exactly; list-fields named by the schema compare as sets of trimmed
//! items, so reordering or repeating an item is not a change. Only the
//! schema's list groups get a [`ChangeBlock`]; a scalar-only change still
//! yields an alert, just without change blocks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::MonitorSchema;
use crate::snapshot::{RecordSnapshot, Snapshot};
use crate::types::RecordId;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What to do with an identifier that has no previous baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSightPolicy {
    /// Record the baseline silently.
    #[default]
    Suppress,
    /// Alert with the full record and no change blocks.
    Alert,
}

/// Added/removed items for one list group.
///
/// All four lists are sorted lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeBlock {
    pub group_key: String,
    pub label: String,
    pub previous: Vec<String>,
    pub current: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// An alert-worthy change for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: RecordId,
    /// Full current record, for display.
    pub record: RecordSnapshot,
    pub changes: Vec<ChangeBlock>,
    /// `true` when the record had no baseline and the policy is
    /// [`FirstSightPolicy::Alert`].
    pub first_sighting: bool,
}

/// Per-record outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum DiffResult {
    Unchanged,
    /// New identifier, suppressed by [`FirstSightPolicy::Suppress`].
    FirstSighting,
    Changed(Alert),
}

impl DiffResult {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            Self::Changed(alert) => Some(alert),
            _ => None,
        }
    }

    pub fn into_alert(self) -> Option<Alert> {
        match self {
            Self::Changed(alert) => Some(alert),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Compare `current` against `previous`.
///
/// Every identifier in `current` gets exactly one result. Identifiers only
/// present in `previous` are ignored (see [`departed`]).
pub fn evaluate(
    previous: &Snapshot,
    current: &Snapshot,
    schema: &MonitorSchema,
    policy: FirstSightPolicy,
) -> BTreeMap<RecordId, DiffResult> {
    current
        .iter()
        .map(|(id, record)| {
            let result = match previous.get(id) {
                None => match policy {
                    FirstSightPolicy::Suppress => DiffResult::FirstSighting,
                    FirstSightPolicy::Alert => DiffResult::Changed(Alert {
                        id: id.clone(),
                        record: record.clone(),
                        changes: Vec::new(),
                        first_sighting: true,
                    }),
                },
                Some(prior) if records_equivalent(prior, record, schema) => DiffResult::Unchanged,
                Some(prior) => DiffResult::Changed(Alert {
                    id: id.clone(),
                    record: record.clone(),
                    changes: change_blocks(prior, record, schema),
                    first_sighting: false,
                }),
            };
            (id.clone(), result)
        })
        .collect()
}

/// Whether two records are equal for change detection.
///
/// Compares the union of field names; a field missing on either side is a
/// difference.
pub fn records_equivalent(
    previous: &RecordSnapshot,
    current: &RecordSnapshot,
    schema: &MonitorSchema,
) -> bool {
    let keys: BTreeSet<&str> = previous.keys().chain(current.keys()).collect();

    keys.into_iter()
        .all(|key| match (previous.get(key), current.get(key)) {
            (Some(a), Some(b)) if schema.is_list_field(key) => a.item_set() == b.item_set(),
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
}

/// One [`ChangeBlock`] per schema list group whose item set differs, in
/// schema order.
pub fn change_blocks(
    previous: &RecordSnapshot,
    current: &RecordSnapshot,
    schema: &MonitorSchema,
) -> Vec<ChangeBlock> {
    schema
        .groups
        .iter()
        .filter_map(|group| {
            let before = previous.item_set(&group.key);
            let after = current.item_set(&group.key);
            if before == after {
                return None;
            }

            Some(ChangeBlock {
                group_key: group.key.clone(),
                label: group.label.clone(),
                added: after.difference(&before).cloned().collect(),
                removed: before.difference(&after).cloned().collect(),
                previous: before.into_iter().collect(),
                current: after.into_iter().collect(),
            })
        })
        .collect()
}

/// Identifiers present in `previous` but gone from `current`.
pub fn departed<'a>(previous: &'a Snapshot, current: &Snapshot) -> Vec<&'a RecordId> {
    previous
        .keys()
        .filter(|id| !current.contains_key(*id))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
