//! Event source adapters.
//!
//! An [`EventSource`] is the narrow seam between the dispatch loop and the
//! OS notification primitive. It registers paths, reports raw kind + name
//! records, and releases its kernel resources on shutdown. It never filters
//! or routes; that is the dispatch loop's job.
//!
//! Exactly one backend is active per process. [`PlatformSource`] names it
//! and is the default type parameter of [`Watcher`](crate::Watcher), so the
//! choice happens at build time rather than through a trait object.
//!
//! - [`NotifySource`] - the platform backend built on `notify`, which picks
//!   inotify, FSEvents, or ReadDirectoryChangesW for the target OS
//! - [`ChannelSource`] - an in-memory backend fed through an
//!   [`EventInjector`], for tests and for embedding existing event streams

mod channel;
mod platform;

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::error::WatchError;
use crate::events::{EventBatch, WatchHandle};

pub use self::channel::{ChannelSource, EventInjector};
pub use self::platform::NotifySource;

/// The backend used by [`Watcher::new`](crate::Watcher::new).
pub type PlatformSource = NotifySource;

/// A source of raw filesystem events.
///
/// # Contract
///
/// - [`register_paths`](Self::register_paths) returns one handle per input
///   path, in input order, or fails without leaving any of them registered.
/// - [`next_events`](Self::next_events) blocks for at most `timeout`. It
///   returns `Ok(Some(batch))` with zero or more events, or `Ok(None)` once
///   the source is closed and drained.
/// - [`unregister`](Self::unregister) and [`close`](Self::close) are
///   idempotent.
pub trait EventSource: Send + 'static {
    /// Starts observing `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::WatchSetup`] naming the first path that cannot
    /// be observed.
    fn register_paths(&mut self, paths: &[Utf8PathBuf]) -> Result<Vec<WatchHandle>, WatchError>;

    /// Waits up to `timeout` for events and returns everything available.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AdapterRead`] if the backend failed.
    fn next_events(&mut self, timeout: Duration) -> Result<Option<EventBatch>, WatchError>;

    /// Stops observing the paths behind `handles`.
    fn unregister(&mut self, handles: &[WatchHandle]) -> Result<(), WatchError>;

    /// Releases every kernel resource held by the source.
    fn close(&mut self) -> Result<(), WatchError>;
}
