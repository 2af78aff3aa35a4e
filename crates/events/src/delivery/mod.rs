//! External delivery channels for alert messages.

pub mod telegram;
