//! Event kinds.
//!
//! The watcher only distinguishes four kinds of change. Backend-specific
//! events that do not map onto one of them are dropped by the adapter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The kind of a filesystem event.
///
/// Each watched path can bind at most one handler per kind.
///
/// # Examples
///
/// ```
/// use fw_core::EventKind;
///
/// let kind: EventKind = "modify".parse().unwrap();
/// assert_eq!(kind, EventKind::Modify);
/// assert_eq!(kind.label(), "modify");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A file or directory was created.
    Create,

    /// A file or directory was deleted.
    Delete,

    /// A file was read or opened.
    Access,

    /// A file's contents or metadata changed.
    Modify,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 4] = [Self::Create, Self::Delete, Self::Access, Self::Modify];

    /// Returns the lowercase name of this kind.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Access => "access",
            Self::Modify => "modify",
        }
    }

    /// Returns a dense index in `0..4`, used for per-kind tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Create => 0,
            Self::Delete => 1,
            Self::Access => 2,
            Self::Modify => 3,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EventKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "created" => Ok(Self::Create),
            "delete" | "deleted" | "remove" => Ok(Self::Delete),
            "access" | "accessed" => Ok(Self::Access),
            "modify" | "modified" => Ok(Self::Modify),
            other => Err(ConfigError::InvalidOption {
                option: "event_kind".to_owned(),
                reason: format!("unknown event kind '{other}'"),
            }),
        }
    }
}
