//! Notification boundary.

use async_trait::async_trait;

/// Delivers one rendered alert message.
///
/// An `Ok` return means the channel accepted the message; only then does
/// the caller arm the record's cooldown.
#[async_trait]
pub trait Notifier: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send(&self, text: &str) -> Result<(), Self::Error>;
}
