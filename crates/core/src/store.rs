//! State store boundary: durable copy of the last accepted snapshot.

use async_trait::async_trait;

use crate::snapshot::Snapshot;

#[async_trait]
pub trait StateStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the stored snapshot; an empty snapshot when nothing was saved.
    async fn load(&self) -> Result<Snapshot, Self::Error>;

    /// Replace the stored snapshot wholesale.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), Self::Error>;
}
