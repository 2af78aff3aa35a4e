//! Telegram delivery.
//!
//! [`TelegramDelivery`] posts each alert to the Bot API `sendMessage`
//! endpoint as HTML. One attempt per alert with a bounded timeout; a
//! failure is returned to the caller, which logs it and moves on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use rxwatch_core::notify::Notifier;

/// Default Bot API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Default HTTP request timeout for a single delivery.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram parse mode used for every message.
const PARSE_MODE: &str = "HTML";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for delivery failures.
///
/// Request errors are stripped of their URL, which embeds the bot token.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The Bot API returned a non-2xx status code.
    #[error("Telegram returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// TelegramConfig
// ---------------------------------------------------------------------------

/// Bot credentials and destination.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Destination chat or group id.
    pub chat_id: String,
    /// Bot API base URL, overridable for tests and proxies.
    pub api_base: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TelegramDelivery
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Delivers alert messages to a Telegram chat.
pub struct TelegramDelivery {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramDelivery {
    /// Create a delivery service with a pre-configured HTTP client.
    pub fn new(config: &TelegramConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.send_message_url(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Execute a single POST request and check the response status.
    pub async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: PARSE_MODE,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }

        tracing::debug!(chat_id = %self.chat_id, "Telegram message accepted");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramDelivery {
    type Error = DeliveryError;

    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        self.deliver(text).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
