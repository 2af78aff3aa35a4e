//! Snapshot source boundary.

use async_trait::async_trait;

use crate::snapshot::Snapshot;

/// Produces the current [`Snapshot`] on demand.
///
/// Implementations must return complete records: every schema field is
/// present, absent values normalized to the empty default.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch(&self) -> Result<Snapshot, Self::Error>;
}
