//! Error types for the fw-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while configuring, starting, running, or stopping a watcher.

use camino::Utf8PathBuf;
use fw_core::ConfigError;

/// Boxed error carried as the cause of a [`WatchError::WatchSetup`].
pub type SetupCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during file watching operations.
///
/// # Error Recovery Strategy
///
/// - **Invalid state** ([`WatchError::InvalidState`]): returned at the
///   offending call; the watcher is unchanged
/// - **Setup failure** ([`WatchError::WatchSetup`]): `start` is aborted and the
///   watcher stays idle, so the caller may fix the path and retry
/// - **Read failure** ([`WatchError::AdapterRead`]): the dispatch loop
///   terminates and the watcher is stopped
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): recoverable, the event
///   is skipped
///
/// # Examples
///
/// ```
/// use fw_watcher::WatchError;
///
/// fn report(err: &WatchError) -> &'static str {
///     match err {
///         WatchError::InvalidState { .. } => "misuse",
///         WatchError::WatchSetup { .. } => "cannot watch",
///         WatchError::AdapterRead(_) => "backend failed",
///         _ => "other",
///     }
/// }
///
/// assert_eq!(report(&WatchError::invalid_state("not started")), "misuse");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// A call was made in a state that does not allow it.
    ///
    /// Configuring a path that was never watched, configuring after `start`,
    /// or applying a [`Behavior`](fw_core::Behavior) to a filter that does not
    /// understand it.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What was wrong.
        reason: String,
    },

    /// The event source could not observe a path.
    #[error("failed to watch '{path}': {source}")]
    WatchSetup {
        /// The path that could not be registered.
        path: Utf8PathBuf,
        /// Why registration failed.
        #[source]
        source: SetupCause,
    },

    /// The event source failed while the dispatch loop was reading from it.
    #[error("event source read failed: {0}")]
    AdapterRead(String),

    /// The specified path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The channel between an event producer and its source was closed.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    ///
    /// Events carrying such a path are logged and skipped.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// Failed to initialize the notify backend.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watcher configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::InvalidState`] error.
    #[inline]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Creates a new [`WatchError::WatchSetup`] error.
    #[inline]
    pub fn watch_setup(path: impl Into<Utf8PathBuf>, source: impl Into<SetupCause>) -> Self {
        Self::WatchSetup {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) | Self::WatchSetup { path, .. } => Some(path),
            Self::InvalidState { .. }
            | Self::AdapterRead(_)
            | Self::ChannelClosed
            | Self::NonUtf8Path(_)
            | Self::Notify(_)
            | Self::Config(_)
            | Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_invalid_state() {
        let err = WatchError::invalid_state("no path to configure");
        assert!(err.is_fatal());
        assert!(err.path().is_none());
        assert_eq!(err.to_string(), "invalid state: no path to configure");
    }

    #[test]
    fn test_watch_setup_carries_path_and_cause() {
        let err = WatchError::watch_setup(
            "/missing",
            WatchError::path_not_found("/missing"),
        );
        assert_eq!(err.path().map(|p| p.as_str()), Some("/missing"));
        assert_eq!(
            err.to_string(),
            "failed to watch '/missing': path does not exist: /missing"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_adapter_read() {
        let err = WatchError::AdapterRead("queue overflow".to_owned());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("queue overflow"));
    }

    #[test]
    fn test_non_utf8_is_recoverable() {
        let err = WatchError::non_utf8_path(PathBuf::from("test"));
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = WatchError::from(ConfigError::invalid_option("poll_interval_ms", "zero"));
        assert_eq!(
            err.to_string(),
            "invalid configuration option 'poll_interval_ms': zero"
        );
    }
}
