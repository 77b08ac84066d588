//! In-memory event source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rustc_hash::FxHashSet;

use super::EventSource;
use crate::error::WatchError;
use crate::events::{EventBatch, RawEvent, WatchHandle};

enum Message {
    Batch(EventBatch),
    Fail(String),
}

/// An [`EventSource`] fed by an [`EventInjector`] instead of the kernel.
///
/// Every injected batch is returned by exactly one `next_events` call. The
/// source reports closed once every injector has been dropped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fw_core::EventKind;
/// use fw_watcher::{ChannelSource, EventSource, RawEvent};
///
/// let (mut source, injector) = ChannelSource::new();
/// injector.send(RawEvent::new(EventKind::Create, "x.txt")).unwrap();
///
/// let batch = source.next_events(Duration::from_millis(10)).unwrap().unwrap();
/// assert_eq!(batch.len(), 1);
///
/// drop(injector);
/// assert!(source.next_events(Duration::from_millis(10)).unwrap().is_none());
/// ```
pub struct ChannelSource {
    rx: Receiver<Message>,
    registered: Vec<Option<Utf8PathBuf>>,
    unobservable: FxHashSet<Utf8PathBuf>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChannelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSource")
            .field("registered", &self.registered)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// The producer half of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct EventInjector {
    tx: Sender<Message>,
    closed: Arc<AtomicBool>,
}

impl ChannelSource {
    /// Creates a source and the injector that feeds it.
    #[must_use]
    pub fn new() -> (Self, EventInjector) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let source = Self {
            rx,
            registered: Vec::new(),
            unobservable: FxHashSet::default(),
            closed: Arc::clone(&closed),
        };
        (source, EventInjector { tx, closed })
    }

    /// Makes registration of `path` fail, as a missing or unreadable path
    /// would for a kernel backend.
    #[must_use]
    pub fn with_unobservable(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.unobservable.insert(path.into());
        self
    }

    /// Returns the paths currently registered, in handle order.
    pub fn registered(&self) -> impl Iterator<Item = &Utf8Path> {
        self.registered.iter().flatten().map(Utf8PathBuf::as_path)
    }
}

impl EventSource for ChannelSource {
    fn register_paths(&mut self, paths: &[Utf8PathBuf]) -> Result<Vec<WatchHandle>, WatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WatchError::invalid_state("event source is closed"));
        }
        if let Some(path) = paths.iter().find(|p| self.unobservable.contains(*p)) {
            return Err(WatchError::watch_setup(
                path.clone(),
                WatchError::path_not_found(path.clone()),
            ));
        }
        let first = self.registered.len();
        self.registered.extend(paths.iter().cloned().map(Some));
        Ok((first..self.registered.len()).map(WatchHandle::new).collect())
    }

    fn next_events(&mut self, timeout: Duration) -> Result<Option<EventBatch>, WatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(Message::Batch(batch)) => Ok(Some(batch)),
            Ok(Message::Fail(reason)) => Err(WatchError::AdapterRead(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(EventBatch::new())),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn unregister(&mut self, handles: &[WatchHandle]) -> Result<(), WatchError> {
        for handle in handles {
            if let Some(slot) = self.registered.get_mut(handle.slot()) {
                *slot = None;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), WatchError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl EventInjector {
    /// Injects a single-event batch.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] once the source is gone.
    pub fn send(&self, event: RawEvent) -> Result<(), WatchError> {
        self.send_batch([event])
    }

    /// Injects a batch, delivered by one `next_events` call.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] once the source is gone.
    pub fn send_batch(&self, events: impl IntoIterator<Item = RawEvent>) -> Result<(), WatchError> {
        self.tx
            .send(Message::Batch(EventBatch::from_events(events)))
            .map_err(|_| WatchError::ChannelClosed)
    }

    /// Makes the next read fail with [`WatchError::AdapterRead`].
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] once the source is gone.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), WatchError> {
        self.tx
            .send(Message::Fail(reason.into()))
            .map_err(|_| WatchError::ChannelClosed)
    }

    /// Returns `true` once the source has released its resources.
    #[must_use]
    pub fn is_source_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
