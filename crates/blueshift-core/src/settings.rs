//! Per-device connection settings.
//!
//! Settings are supplied when a device is created and never change for the
//! lifetime of that device.
//!
//! # Examples
//!
//! ```
//! use blueshift_core::{ConnectionSettings, ReconnectionSettings};
//!
//! let settings: ConnectionSettings = serde_json::from_str(
//!     r#"{ "reconnection": { "mode": "limited", "attempts": 3 } }"#,
//! ).unwrap();
//!
//! assert_eq!(settings.reconnection, ReconnectionSettings::Limited(3));
//! assert!(settings.validate().is_ok());
//! ```

use crate::{
    Result,
    constants::{
        DEFAULT_EVENT_BUFFER_SIZE, DEFAULT_RECONNECT_DELAY_MS, MAX_EVENT_BUFFER_SIZE,
        MAX_RECONNECT_DELAY_MS,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What a device does after its connection drops without being asked to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "attempts", rename_all = "snake_case")]
pub enum ReconnectionSettings {
    /// Reconnect every time, without limit.
    Always,

    /// Stay disconnected.
    #[default]
    Never,

    /// Reconnect up to this many consecutive attempts.
    Limited(u32),
}

impl fmt::Display for ReconnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Never => write!(f, "Never"),
            Self::Limited(n) => write!(f, "Limited({n})"),
        }
    }
}

impl std::str::FromStr for ReconnectionSettings {
    type Err = Error;

    /// Parse `always`, `never` or `limited:<attempts>`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.split_once(':') {
            None if normalized == "always" => Ok(Self::Always),
            None if normalized == "never" => Ok(Self::Never),
            Some(("limited", attempts)) => attempts
                .trim()
                .parse()
                .map(Self::Limited)
                .map_err(|_| Error::Config(format!("invalid reconnection attempts: {attempts}"))),
            _ => Err(Error::Config(format!("unknown reconnection mode: {s}"))),
        }
    }
}

/// Verbosity of per-device logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(Error::Config(format!("unknown log level: {other}"))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(level)
    }
}

/// Settings applied to one device's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Number of recent events replayed to a late subscriber.
    pub event_buffer_size: usize,

    /// Reconnection policy after an unexpected disconnect.
    pub reconnection: ReconnectionSettings,

    /// Pause before each reconnection attempt, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Verbosity of this device's log output.
    pub log_level: LogLevel,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            reconnection: ReconnectionSettings::default(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            log_level: LogLevel::default(),
        }
    }
}

impl ConnectionSettings {
    /// Set the reconnection policy.
    pub fn with_reconnection(mut self, reconnection: ReconnectionSettings) -> Self {
        self.reconnection = reconnection;
        self
    }

    /// Set the pause before each reconnection attempt.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Set the event replay window.
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Validate the settings.
    ///
    /// # Errors
    /// Returns `Error::Config` if the event buffer exceeds
    /// [`MAX_EVENT_BUFFER_SIZE`] or the reconnection pause exceeds
    /// [`MAX_RECONNECT_DELAY_MS`].
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "event_buffer_size must be at most {MAX_EVENT_BUFFER_SIZE}, got {}",
                self.event_buffer_size
            )));
        }
        if self.reconnect_delay_ms > MAX_RECONNECT_DELAY_MS {
            return Err(Error::Config(format!(
                "reconnect_delay_ms must be at most {MAX_RECONNECT_DELAY_MS}, got {}",
                self.reconnect_delay_ms
            )));
        }
        Ok(())
    }
}
