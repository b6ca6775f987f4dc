//! Configuration loading from TOML and environment variables.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventsConfig {
    /// Polling subscription settings.
    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,

    /// Channel subscription settings.
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Settings for [`Subscriptions`](crate::Subscriptions).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionsConfig {
    /// Sleep between reaper scans.
    #[serde(
        rename = "reap_interval_ms",
        default = "default_reap_interval",
        deserialize_with = "millis"
    )]
    pub reap_interval: Duration,

    /// Idle time after which an unpolled subscription is removed.
    #[serde(
        rename = "reap_threshold_ms",
        default = "default_reap_threshold",
        deserialize_with = "millis"
    )]
    pub reap_threshold: Duration,

    /// Whether to run the reaper thread at all.
    #[serde(default = "default_reaper_enabled")]
    pub reaper_enabled: bool,
}

/// Settings for [`ChannelSubscription`](crate::emitter::ChannelSubscription).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Messages buffered per channel before new ones are dropped.
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_reap_threshold() -> Duration {
    Duration::from_secs(20)
}

fn default_reaper_enabled() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    1024
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        Self {
            reap_interval: default_reap_interval(),
            reap_threshold: default_reap_threshold(),
            reaper_enabled: default_reaper_enabled(),
        }
    }
}

impl SubscriptionsConfig {
    /// Rejects zero durations.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "subscriptions.reap_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.reap_threshold.is_zero() {
            return Err(ConfigError::Invalid {
                field: "subscriptions.reap_threshold_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_channel_capacity(),
        }
    }
}

impl EventsConfig {
    /// Parses and validates TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first zero-valued setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.subscriptions.validate()?;
        if self.channel.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "channel.capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Applies overrides from a variable lookup:
    ///
    /// - `CHAIN_EVENTS_REAP_INTERVAL_MS` overrides `subscriptions.reap_interval_ms`
    /// - `CHAIN_EVENTS_REAP_THRESHOLD_MS` overrides `subscriptions.reap_threshold_ms`
    /// - `CHAIN_EVENTS_REAPER_ENABLED` overrides `subscriptions.reaper_enabled`
    /// - `CHAIN_EVENTS_CHANNEL_CAPACITY` overrides `channel.capacity`
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = lookup("CHAIN_EVENTS_REAP_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.subscriptions.reap_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = lookup("CHAIN_EVENTS_REAP_THRESHOLD_MS").and_then(|v| v.parse().ok()) {
            self.subscriptions.reap_threshold = Duration::from_millis(ms);
        }
        if let Some(enabled) = lookup("CHAIN_EVENTS_REAPER_ENABLED") {
            self.subscriptions.reaper_enabled = enabled == "true" || enabled == "1";
        }
        if let Some(capacity) = lookup("CHAIN_EVENTS_CHANNEL_CAPACITY").and_then(|v| v.parse().ok()) {
            self.channel.capacity = capacity;
        }
    }
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist, then applies environment overrides.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the resulting values are invalid.
pub fn load_config(path: Option<&str>) -> Result<EventsConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                EventsConfig::default()
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: p.to_string(),
                    message: e.to_string(),
                })
            }
        },
        None => EventsConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
