//! Filter engine for per-path event filtering.
//!
//! Every watched path carries a [`FilterSet`] made of three independent
//! categories:
//!
//! - [`ExtensionRules`] - suffix include/exclude sets
//! - [`FilenameRules`] - substring include/exclude and exact equal/unequal sets
//! - [`PredicateFilters`] - user-supplied `Fn(&str) -> bool` closures
//!
//! # Composition
//!
//! Within a category, positive terms combine with OR and negative terms with
//! AND. Across categories the results combine with AND. A category with no
//! configuration never rejects a name:
//!
//! ```text
//! accept(name) = extension(name) && filename(name) && predicate(name)
//!
//! extension = (include = {} || ends_with(any include)) && !ends_with(any exclude)
//! filename  = (contains = {} && equal = {} || contains(any) || equals(any))
//!          && !contains(any not_contains) && !equals(any unequal)
//! predicate = predicates = [] || any(predicate(name))
//! ```
//!
//! Comparisons are case-sensitive and byte-wise.
//!
//! # Examples
//!
//! ```
//! use fw_core::Behavior;
//! use fw_watcher::{FilterSet, NameFilter};
//!
//! let mut filters = FilterSet::default();
//! filters.extensions.add(Behavior::Include, [".txt", ".md"]).unwrap();
//! filters.filenames.add(Behavior::Exclude, "draft").unwrap();
//!
//! assert!(filters.accepts("notes.txt"));
//! assert!(!filters.accepts("notes.jpg"));
//! assert!(!filters.accepts("draft-notes.md"));
//! ```

use std::fmt;

use fw_core::Behavior;
use rustc_hash::FxHashSet;

use crate::error::WatchError;

/// A predicate deciding whether a filename passes.
///
/// Implemented by each filter category and by [`FilterSet`] itself.
///
/// # Thread Safety
///
/// Filters are evaluated on the dispatch loop's blocking thread, so they must
/// be [`Send`] and [`Sync`].
///
/// # Examples
///
/// ```
/// use fw_watcher::NameFilter;
///
/// struct NoHidden;
///
/// impl NameFilter for NoHidden {
///     fn accepts(&self, name: &str) -> bool {
///         !name.starts_with('.')
///     }
/// }
///
/// assert!(NoHidden.accepts("a.txt"));
/// assert!(!NoHidden.accepts(".swp"));
/// ```
pub trait NameFilter: Send + Sync {
    /// Returns `true` if events for `name` should reach the handler.
    fn accepts(&self, name: &str) -> bool;
}

impl<F: NameFilter + ?Sized> NameFilter for std::sync::Arc<F> {
    fn accepts(&self, name: &str) -> bool {
        (**self).accepts(name)
    }
}

/// One or more filter terms.
///
/// Lets the filter methods take either a single term or a list of terms.
///
/// # Examples
///
/// ```
/// use fw_watcher::IntoTerms;
///
/// assert_eq!(".txt".into_terms(), vec![".txt"]);
/// assert_eq!([".exe", ".pdf"].into_terms(), vec![".exe", ".pdf"]);
/// ```
pub trait IntoTerms {
    /// Converts `self` into owned terms.
    fn into_terms(self) -> Vec<String>;
}

impl IntoTerms for &str {
    fn into_terms(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl IntoTerms for String {
    fn into_terms(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoTerms for &String {
    fn into_terms(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>, const N: usize> IntoTerms for [S; N] {
    fn into_terms(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

impl<S: AsRef<str>> IntoTerms for &[S] {
    fn into_terms(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

impl<S: AsRef<str>> IntoTerms for Vec<S> {
    fn into_terms(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_owned()).collect()
    }
}

/// Inserts non-empty terms. An empty term would match every name.
fn insert_terms(set: &mut FxHashSet<String>, terms: Vec<String>) {
    for term in terms {
        if term.is_empty() {
            tracing::debug!("Ignoring empty filter term");
            continue;
        }
        set.insert(term);
    }
}

/// Suffix rules on the filename.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRules {
    /// Suffixes of which a name must end with at least one, when non-empty.
    pub include: FxHashSet<String>,

    /// Suffixes a name must not end with.
    pub exclude: FxHashSet<String>,
}

impl ExtensionRules {
    /// Adds terms under the given behavior.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] for behaviors other than
    /// [`Behavior::Include`] and [`Behavior::Exclude`].
    pub fn add(&mut self, behavior: Behavior, terms: impl IntoTerms) -> Result<(), WatchError> {
        if !behavior.applies_to_extension() {
            return Err(WatchError::invalid_state(format!(
                "extension filters do not support {behavior:?}"
            )));
        }
        let set = if behavior == Behavior::Include {
            &mut self.include
        } else {
            &mut self.exclude
        };
        insert_terms(set, terms.into_terms());
        Ok(())
    }

    /// Returns `true` if no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

impl NameFilter for ExtensionRules {
    fn accepts(&self, name: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|ext| name.ends_with(ext.as_str()));
        included && !self.exclude.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Substring and exact-match rules on the filename.
#[derive(Debug, Clone, Default)]
pub struct FilenameRules {
    /// Substrings of which a name may contain one to pass.
    pub substring_include: FxHashSet<String>,

    /// Substrings a name must not contain.
    pub substring_exclude: FxHashSet<String>,

    /// Names that pass when matched exactly.
    pub exact_equal: FxHashSet<String>,

    /// Names that are rejected when matched exactly.
    pub exact_unequal: FxHashSet<String>,
}

impl FilenameRules {
    /// Adds terms under the given behavior.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] for [`Behavior::Normal`].
    pub fn add(&mut self, behavior: Behavior, terms: impl IntoTerms) -> Result<(), WatchError> {
        if !behavior.applies_to_filename() {
            return Err(WatchError::invalid_state(format!(
                "filename filters do not support {behavior:?}"
            )));
        }
        let set = match behavior {
            Behavior::Include => &mut self.substring_include,
            Behavior::Exclude => &mut self.substring_exclude,
            Behavior::Equal => &mut self.exact_equal,
            // Normal is rejected above.
            Behavior::Unequal | Behavior::Normal => &mut self.exact_unequal,
        };
        insert_terms(set, terms.into_terms());
        Ok(())
    }

    /// Returns `true` if no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.substring_include.is_empty()
            && self.substring_exclude.is_empty()
            && self.exact_equal.is_empty()
            && self.exact_unequal.is_empty()
    }

    fn positive(&self, name: &str) -> bool {
        (self.substring_include.is_empty() && self.exact_equal.is_empty())
            || self
                .substring_include
                .iter()
                .any(|s| name.contains(s.as_str()))
            || self.exact_equal.contains(name)
    }

    fn negative(&self, name: &str) -> bool {
        !self
            .substring_exclude
            .iter()
            .any(|s| name.contains(s.as_str()))
            && !self.exact_unequal.contains(name)
    }
}

impl NameFilter for FilenameRules {
    fn accepts(&self, name: &str) -> bool {
        self.positive(name) && self.negative(name)
    }
}

/// A user-supplied filename predicate.
pub type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Ordered user predicates, combined with OR.
#[derive(Default)]
pub struct PredicateFilters {
    predicates: Vec<Predicate>,
}

impl PredicateFilters {
    /// Appends a predicate.
    pub fn push<F>(&mut self, predicate: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
    }

    /// Returns the number of predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns `true` if no predicates are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl fmt::Debug for PredicateFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateFilters")
            .field("len", &self.predicates.len())
            .finish()
    }
}

impl NameFilter for PredicateFilters {
    fn accepts(&self, name: &str) -> bool {
        self.predicates.is_empty() || self.predicates.iter().any(|p| p(name))
    }
}

/// All filter categories of one watched path, combined with AND.
#[derive(Debug, Default)]
pub struct FilterSet {
    /// Suffix rules.
    pub extensions: ExtensionRules,

    /// Substring and exact-match rules.
    pub filenames: FilenameRules,

    /// User predicates.
    pub predicates: PredicateFilters,
}

impl FilterSet {
    /// Returns `true` if no category has any configuration.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.filenames.is_empty() && self.predicates.is_empty()
    }
}

impl NameFilter for FilterSet {
    fn accepts(&self, name: &str) -> bool {
        self.extensions.accepts(name) && self.filenames.accepts(name) && self.predicates.accepts(name)
    }
}
