//! Watch registry and fluent path configuration.
//!
//! The [`Registry`] owns every watched path in the order it was first
//! watched. Each [`WatchedPath`] owns a [`PathConfig`]: its [`FilterSet`] and
//! one optional [`Handler`] per [`EventKind`].
//!
//! Configuration goes through a [`PathBuilder`] returned by
//! [`Registry::watch`]. The builder is scoped to a single path, so filters and
//! handlers always land on the path they were written under:
//!
//! ```
//! use fw_core::Behavior;
//! use fw_watcher::Registry;
//!
//! # fn main() -> Result<(), fw_watcher::WatchError> {
//! let mut registry = Registry::default();
//! registry
//!     .watch("/var/log")?
//!     .filter_by_extension(Behavior::Include, ".log")?
//!     .on_modified(|name| println!("{name} changed"))
//!     .watch("/tmp/inbox")?
//!     .filter_by_filename(Behavior::Exclude, ["~", ".part"])?
//!     .on_create(|name| println!("{name} arrived"));
//!
//! assert_eq!(registry.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::{Behavior, EventKind, WatchOptions};
use rustc_hash::FxHashMap;

use crate::error::WatchError;
use crate::filter::{FilterSet, IntoTerms, NameFilter};

/// A callback bound to one event kind of one watched path.
///
/// Handlers run synchronously on the dispatch loop's thread and receive the
/// event's filename.
pub type Handler = Arc<dyn Fn(&str) + Send + Sync>;

/// Handlers of one watched path, at most one per [`EventKind`].
#[derive(Clone, Default)]
pub struct Handlers {
    slots: [Option<Handler>; 4],
}

impl Handlers {
    /// Binds `handler` to `kind`, replacing any previous handler.
    pub fn set(&mut self, kind: EventKind, handler: Handler) {
        if self.slots[kind.index()].replace(handler).is_some() {
            tracing::debug!(kind = %kind, "Replacing existing handler");
        }
    }

    /// Returns the handler bound to `kind`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, kind: EventKind) -> Option<&Handler> {
        self.slots[kind.index()].as_ref()
    }

    /// Returns the kinds that have a handler.
    pub fn bound_kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.slots[kind.index()].is_some())
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bound_kinds()).finish()
    }
}

/// Filters and handlers of one watched path.
#[derive(Debug, Default)]
pub struct PathConfig {
    /// Rules deciding which filenames reach the handlers.
    pub filters: FilterSet,

    /// Handlers per event kind.
    pub handlers: Handlers,
}

impl PathConfig {
    /// Returns the handler that should run for `name` on a `kind` event.
    ///
    /// `None` when no handler is bound for `kind` or the filters reject
    /// `name`. Filters are only evaluated when a handler is bound.
    #[must_use]
    pub fn handler_for(&self, kind: EventKind, name: &str) -> Option<&Handler> {
        self.handlers
            .get(kind)
            .filter(|_| self.filters.accepts(name))
    }
}

/// A path registered for change notification.
#[derive(Debug)]
pub struct WatchedPath {
    path: Utf8PathBuf,
    config: PathConfig,
}

impl WatchedPath {
    /// Returns the absolute path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the path's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PathConfig {
        &self.config
    }
}

/// The set of watched paths plus watcher-wide options.
///
/// Paths are unique and kept in first-watched order, which is also the order
/// the dispatch loop visits them in.
#[derive(Debug, Default)]
pub struct Registry {
    paths: Vec<WatchedPath>,
    index: FxHashMap<Utf8PathBuf, usize>,
    options: WatchOptions,
}

impl Registry {
    /// Creates an empty registry with the given options.
    #[must_use]
    pub fn with_options(options: WatchOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Registers `path` and returns a builder scoped to it.
    ///
    /// Relative paths are made absolute against the current directory.
    /// Watching a path again keeps its existing configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if the current directory cannot be read and
    /// [`WatchError::NonUtf8Path`] if the absolute path is not UTF-8.
    pub fn watch(&mut self, path: impl AsRef<Utf8Path>) -> Result<PathBuilder<'_>, WatchError> {
        let path = absolutize(path.as_ref())?;
        let slot = match self.index.get(&path) {
            Some(&slot) => slot,
            None => {
                let slot = self.paths.len();
                tracing::debug!(path = %path, "Registering watched path");
                self.index.insert(path.clone(), slot);
                self.paths.push(WatchedPath {
                    path,
                    config: PathConfig::default(),
                });
                slot
            }
        };
        Ok(PathBuilder {
            registry: self,
            slot,
        })
    }

    /// Returns a builder for a path that is already watched.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] if `path` was never watched, since
    /// there is no target to configure.
    pub fn configure(&mut self, path: impl AsRef<Utf8Path>) -> Result<PathBuilder<'_>, WatchError> {
        let path = absolutize(path.as_ref())?;
        let slot = self.index.get(&path).copied().ok_or_else(|| {
            WatchError::invalid_state(format!("'{path}' is not watched; call watch() first"))
        })?;
        Ok(PathBuilder {
            registry: self,
            slot,
        })
    }

    /// ORs `option` into the watcher-wide options.
    pub fn set_option(&mut self, option: WatchOptions) {
        self.options |= option;
    }

    /// Returns the watcher-wide options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> WatchOptions {
        self.options
    }

    /// Returns the watched paths in first-watched order.
    #[inline]
    #[must_use]
    pub fn paths(&self) -> &[WatchedPath] {
        &self.paths
    }

    /// Looks up a watched path.
    #[must_use]
    pub fn get(&self, path: &Utf8Path) -> Option<&WatchedPath> {
        self.index.get(path).map(|&slot| &self.paths[slot])
    }

    /// Returns the number of watched paths.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if no path is watched.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn absolutize(path: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let absolute = std::path::absolute(path.as_std_path())?;
    Utf8PathBuf::try_from(absolute).map_err(|e| WatchError::non_utf8_path(e.into_path_buf()))
}

/// Fluent configuration of one watched path.
///
/// Returned by [`Registry::watch`] (and by `Watcher::watch`). Every method
/// targets the path the builder was created for.
pub struct PathBuilder<'a> {
    registry: &'a mut Registry,
    slot: usize,
}

impl fmt::Debug for PathBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathBuilder")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

impl<'a> PathBuilder<'a> {
    fn config(&mut self) -> &mut PathConfig {
        &mut self.registry.paths[self.slot].config
    }

    /// Returns the path being configured.
    pub fn path(&self) -> &Utf8Path {
        &self.registry.paths[self.slot].path
    }

    /// Adds suffix rules.
    ///
    /// [`Behavior::Include`] adds to the include set and
    /// [`Behavior::Exclude`] to the exclude set.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] for any other behavior.
    pub fn filter_by_extension(
        mut self,
        behavior: Behavior,
        terms: impl IntoTerms,
    ) -> Result<Self, WatchError> {
        self.config().filters.extensions.add(behavior, terms)?;
        Ok(self)
    }

    /// Adds filename rules.
    ///
    /// [`Behavior::Include`] / [`Behavior::Exclude`] match substrings,
    /// [`Behavior::Equal`] / [`Behavior::Unequal`] match the whole name.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] for [`Behavior::Normal`].
    pub fn filter_by_filename(
        mut self,
        behavior: Behavior,
        terms: impl IntoTerms,
    ) -> Result<Self, WatchError> {
        self.config().filters.filenames.add(behavior, terms)?;
        Ok(self)
    }

    /// Appends a predicate. Predicates of one path combine with OR.
    pub fn filter_by_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.config().filters.predicates.push(predicate);
        self
    }

    /// Appends a [`NameFilter`] as a predicate.
    pub fn filter_with<F: NameFilter + 'static>(self, filter: F) -> Self {
        self.filter_by_predicate(move |name| filter.accepts(name))
    }

    /// Binds `handler` to `kind`, replacing any previous handler.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.config().handlers.set(kind, Arc::new(handler));
        self
    }

    /// Binds the create handler.
    pub fn on_create<F>(self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(EventKind::Create, handler)
    }

    /// Binds the delete handler.
    pub fn on_delete<F>(self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(EventKind::Delete, handler)
    }

    /// Binds the access handler.
    pub fn on_access<F>(self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(EventKind::Access, handler)
    }

    /// Binds the modify handler.
    pub fn on_modified<F>(self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(EventKind::Modify, handler)
    }

    /// ORs `option` into the watcher-wide options.
    pub fn set_option(self, option: WatchOptions) -> Self {
        self.registry.set_option(option);
        self
    }

    /// Registers another path and continues the chain on it.
    ///
    /// # Errors
    ///
    /// See [`Registry::watch`].
    pub fn watch(self, path: impl AsRef<Utf8Path>) -> Result<PathBuilder<'a>, WatchError> {
        self.registry.watch(path)
    }
}
