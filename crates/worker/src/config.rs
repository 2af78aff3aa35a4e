//! Monitor configuration loaded from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rxwatch_core::diff::FirstSightPolicy;
use rxwatch_core::error::CoreError;
use rxwatch_core::schema::MonitorSchema;
use rxwatch_events::delivery::telegram::{DEFAULT_API_BASE, DEFAULT_TIMEOUT};
use rxwatch_events::TelegramConfig;

use crate::poll::{LoopSettings, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_DELAY};

/// Default state file, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "last_state.json";

/// Default cooldown window in minutes.
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to read schema file {path}: {source}")]
    SchemaFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Schema(#[from] CoreError),
}

/// Everything the worker needs to start.
#[derive(Clone)]
pub struct MonitorConfig {
    pub database_url: String,
    pub telegram: TelegramConfig,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub cooldown: Duration,
    pub first_sight: FirstSightPolicy,
    pub state_file: PathBuf,
    /// Custom schema document; the built-in reference schema when `None`.
    pub schema_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Variable               | Required | Default                    |
    /// |------------------------|----------|----------------------------|
    /// | `DATABASE_URL`         | yes      | --                         |
    /// | `TELEGRAM_BOT_TOKEN`   | yes      | --                         |
    /// | `TELEGRAM_CHAT_ID`     | yes      | --                         |
    /// | `TELEGRAM_API_BASE`    | no       | `https://api.telegram.org` |
    /// | `NOTIFY_TIMEOUT_SECS`  | no       | `10`                       |
    /// | `POLL_INTERVAL_SECS`   | no       | `60`                       |
    /// | `RETRY_DELAY_SECS`     | no       | `10`                       |
    /// | `COOLDOWN_MINUTES`     | no       | `30`                       |
    /// | `ALERT_ON_FIRST_SIGHT` | no       | `false`                    |
    /// | `STATE_FILE`           | no       | `last_state.json`          |
    /// | `MONITOR_SCHEMA_PATH`  | no       | built-in schema            |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let bot_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        let chat_id = get("TELEGRAM_CHAT_ID").ok_or(ConfigError::Missing("TELEGRAM_CHAT_ID"))?;

        let notify_timeout = parse_secs(
            "NOTIFY_TIMEOUT_SECS",
            get("NOTIFY_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT,
        )?;
        let telegram = TelegramConfig::new(bot_token, chat_id)
            .api_base(get("TELEGRAM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()))
            .timeout(notify_timeout);

        let poll_interval = parse_secs(
            "POLL_INTERVAL_SECS",
            get("POLL_INTERVAL_SECS"),
            DEFAULT_POLL_INTERVAL,
        )?;
        let retry_delay = parse_secs(
            "RETRY_DELAY_SECS",
            get("RETRY_DELAY_SECS"),
            DEFAULT_RETRY_DELAY,
        )?;
        let cooldown_minutes = match get("COOLDOWN_MINUTES") {
            Some(raw) => parse_u64("COOLDOWN_MINUTES", &raw)?,
            None => DEFAULT_COOLDOWN_MINUTES,
        };

        let alert_on_first_sight = match get("ALERT_ON_FIRST_SIGHT") {
            Some(raw) => parse_bool("ALERT_ON_FIRST_SIGHT", &raw)?,
            None => false,
        };
        let first_sight = if alert_on_first_sight {
            FirstSightPolicy::Alert
        } else {
            FirstSightPolicy::Suppress
        };

        Ok(Self {
            database_url,
            telegram,
            poll_interval,
            retry_delay,
            cooldown: Duration::from_secs(cooldown_minutes.saturating_mul(60)),
            first_sight,
            state_file: get("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            schema_path: get("MONITOR_SCHEMA_PATH").map(PathBuf::from),
        })
    }

    /// Timing and policy settings for the poll loop.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            poll_interval: self.poll_interval,
            retry_delay: self.retry_delay,
            cooldown: self.cooldown,
            first_sight: self.first_sight,
        }
    }

    /// Load and validate the monitor schema.
    pub fn load_schema(&self) -> Result<MonitorSchema, ConfigError> {
        match &self.schema_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::SchemaFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok(MonitorSchema::from_json(&raw)?)
            }
            None => {
                let schema = MonitorSchema::reference();
                schema.validate()?;
                Ok(schema)
            }
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("database_url", &"<redacted>")
            .field("telegram", &self.telegram)
            .field("poll_interval", &self.poll_interval)
            .field("retry_delay", &self.retry_delay)
            .field("cooldown", &self.cooldown)
            .field("first_sight", &self.first_sight)
            .field("state_file", &self.state_file)
            .field("schema_path", &self.schema_path)
            .finish()
    }
}

fn parse_u64(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a positive number of seconds, falling back to `default` when unset.
fn parse_secs(
    var: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match parse_u64(var, &raw)? {
        0 => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be greater than zero".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://monitor:pw@db/clinical"),
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("TELEGRAM_CHAT_ID", "-1001"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_unset() {
        let config = config_from(&REQUIRED).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert_eq!(config.cooldown, Duration::from_secs(30 * 60));
        assert_eq!(config.first_sight, FirstSightPolicy::Suppress);
        assert_eq!(config.state_file, PathBuf::from("last_state.json"));
        assert_eq!(config.telegram.api_base, DEFAULT_API_BASE);
        assert_eq!(config.telegram.timeout, Duration::from_secs(10));
        assert!(config.schema_path.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("POLL_INTERVAL_SECS", "120"),
            ("RETRY_DELAY_SECS", "5"),
            ("COOLDOWN_MINUTES", "45"),
            ("ALERT_ON_FIRST_SIGHT", "yes"),
            ("STATE_FILE", "/var/lib/rxwatch/state.json"),
            ("NOTIFY_TIMEOUT_SECS", "3"),
        ]);
        let config = config_from(&pairs).unwrap();
        let settings = config.loop_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(120));
        assert_eq!(settings.retry_delay, Duration::from_secs(5));
        assert_eq!(settings.cooldown, Duration::from_secs(45 * 60));
        assert_eq!(settings.first_sight, FirstSightPolicy::Alert);
        assert_eq!(config.telegram.timeout, Duration::from_secs(3));
        assert_eq!(config.state_file, PathBuf::from("/var/lib/rxwatch/state.json"));
    }

    #[test]
    fn missing_required_var_is_reported() {
        let result = config_from(&REQUIRED[..2]);
        assert_matches!(result, Err(ConfigError::Missing("TELEGRAM_CHAT_ID")));
    }

    #[test]
    fn blank_required_var_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("DATABASE_URL", "  ");
        assert_matches!(config_from(&pairs), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLL_INTERVAL_SECS", "soon"));
        assert_matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { var: "POLL_INTERVAL_SECS", .. })
        );

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RETRY_DELAY_SECS", "0"));
        assert_matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { var: "RETRY_DELAY_SECS", .. })
        );
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALERT_ON_FIRST_SIGHT", "maybe"));
        assert_matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid { var: "ALERT_ON_FIRST_SIGHT", .. })
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let config = config_from(&REQUIRED).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("pw@db"));
        assert!(!debug.contains("123:abc"));
    }

    #[test]
    fn reference_schema_is_default() {
        let config = config_from(&REQUIRED).unwrap();
        assert_eq!(config.load_schema().unwrap(), MonitorSchema::reference());
    }

    #[test]
    fn missing_schema_file_is_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MONITOR_SCHEMA_PATH", "/nonexistent/schema.json"));
        let config = config_from(&pairs).unwrap();
        assert_matches!(config.load_schema(), Err(ConfigError::SchemaFile { .. }));
    }
}
