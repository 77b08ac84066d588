//! Configuration for the watcher engine.
//!
//! [`WatcherConfig`] carries the runtime knobs that are not part of the
//! per-path filter/handler registry: how long the dispatch loop waits on the
//! event source before re-checking for cancellation, whether directories are
//! watched recursively, and how raw events are routed to watched paths.
//!
//! The configuration round-trips through JSON and every field has a default,
//! so partial files are accepted.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::WatchOptions;

/// How raw events are routed to watched paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// Evaluate every watched path's filters for every event.
    ///
    /// A single kernel queue is shared by all watches, so this is the only
    /// mode that works for backends that cannot tell which watch produced an
    /// event.
    #[default]
    FanOut,

    /// Only evaluate the watched path that produced the event when the
    /// backend reports it. Events without an origin still fan out.
    ByOrigin,
}

/// Runtime configuration for a watcher.
///
/// # Examples
///
/// ```
/// use fw_core::{Routing, WatcherConfig};
///
/// let config = WatcherConfig::default();
/// assert_eq!(config.poll_interval_ms, 100);
/// assert!(!config.recursive);
/// assert_eq!(config.routing, Routing::FanOut);
///
/// let config = WatcherConfig::from_json_str(r#"{"recursive": true}"#).unwrap();
/// assert!(config.recursive);
/// assert_eq!(config.poll_interval_ms, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// How long a single `next_events` call may block, in milliseconds.
    ///
    /// Cancellation is observed between calls, so this bounds how long
    /// `stop` waits on a quiet filesystem.
    pub poll_interval_ms: u64,

    /// Whether directories are watched recursively.
    pub recursive: bool,

    /// Capacity of the channel between the OS backend and the dispatch loop.
    pub channel_capacity: usize,

    /// How raw events are routed to watched paths.
    pub routing: Routing,

    /// Start with [`WatchOptions::DEBUG`] set.
    pub debug: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            recursive: false,
            channel_capacity: 1024,
            routing: Routing::FanOut,
            debug: false,
        }
    }
}

impl WatcherConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Checks that every field holds a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Returns the option set implied by this configuration.
    #[must_use]
    pub fn options(&self) -> WatchOptions {
        if self.debug {
            WatchOptions::DEBUG
        } else {
            WatchOptions::empty()
        }
    }

    /// Returns the poll interval as a [`Duration`](std::time::Duration).
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
