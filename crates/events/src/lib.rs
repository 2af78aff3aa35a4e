//! rxwatch alert delivery.
//!
//! - [`delivery::telegram`]: Telegram Bot API `sendMessage` delivery, the
//!   production [`Notifier`](rxwatch_core::notify::Notifier).

pub mod delivery;

pub use delivery::telegram::{DeliveryError, TelegramConfig, TelegramDelivery};
