//! Filter behaviors.

use serde::{Deserialize, Serialize};

/// How a filter term is applied to a filename.
///
/// Extension filters understand [`Include`](Self::Include) and
/// [`Exclude`](Self::Exclude). Filename filters additionally understand
/// [`Equal`](Self::Equal) and [`Unequal`](Self::Unequal). [`Normal`](Self::Normal)
/// is the placeholder passed to `start` when no special behavior applies.
///
/// # Examples
///
/// ```
/// use fw_core::Behavior;
///
/// assert!(Behavior::Include.applies_to_extension());
/// assert!(!Behavior::Equal.applies_to_extension());
/// assert!(Behavior::Equal.applies_to_filename());
/// assert!(!Behavior::Normal.applies_to_filename());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Keep names that end with (extension) or contain (filename) a term.
    Include,

    /// Drop names that end with (extension) or contain (filename) a term.
    Exclude,

    /// Keep names exactly equal to a term.
    Equal,

    /// Drop names exactly equal to a term.
    Unequal,

    /// No special behavior.
    #[default]
    Normal,
}

impl Behavior {
    /// Returns `true` if this behavior is meaningful for extension filters.
    #[inline]
    #[must_use]
    pub const fn applies_to_extension(self) -> bool {
        matches!(self, Self::Include | Self::Exclude)
    }

    /// Returns `true` if this behavior is meaningful for filename filters.
    #[inline]
    #[must_use]
    pub const fn applies_to_filename(self) -> bool {
        !matches!(self, Self::Normal)
    }
}
