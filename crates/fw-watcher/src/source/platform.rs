//! Platform event source built on `notify`.
//!
//! `notify` delivers events on its own thread through a callback. The
//! callback forwards them into a bounded channel; `next_events` drains that
//! channel on the dispatch loop's thread and decodes each `notify::Event`
//! into [`RawEvent`]s.
//!
//! ```text
//! ┌──────────────────────────┐  try_send   ┌────────────────────────────┐
//! │ RecommendedWatcher       │ ──────────► │ crossbeam Receiver         │
//! │ (inotify/FSEvents/RDCW)  │             │ NotifySource::next_events  │
//! └──────────────────────────┘             └────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam_channel::{Receiver, RecvTimeoutError, TrySendError};
use fw_core::{EventKind, WatcherConfig};
use notify::event::AccessKind;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};

use super::EventSource;
use crate::error::WatchError;
use crate::events::{EventBatch, RawEvent, WatchHandle};

/// The platform [`EventSource`], backed by [`notify::RecommendedWatcher`].
///
/// Event names are the final component of the changed path. The origin hint
/// is the handle of the deepest registered root containing that path.
pub struct NotifySource {
    watcher: Option<RecommendedWatcher>,
    rx: Receiver<notify::Result<notify::Event>>,
    roots: Vec<Option<Utf8PathBuf>>,
    mode: RecursiveMode,
    /// A read failure found after part of a batch was already decoded.
    pending_error: Option<WatchError>,
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("roots", &self.roots)
            .field("recursive", &matches!(self.mode, RecursiveMode::Recursive))
            .field("closed", &self.watcher.is_none())
            .finish_non_exhaustive()
    }
}

impl NotifySource {
    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the OS watcher cannot be created
    /// (for example when the inotify instance limit is reached).
    pub fn new(config: &WatcherConfig) -> Result<Self, WatchError> {
        let (tx, rx) = crossbeam_channel::bounded(config.channel_capacity);

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match tx.try_send(res) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Event queue full, dropping filesystem event");
                }
            }
        })?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        Ok(Self {
            watcher: Some(watcher),
            rx,
            roots: Vec::new(),
            mode,
            pending_error: None,
        })
    }

    fn watch_one(
        watcher: &mut RecommendedWatcher,
        path: &Utf8Path,
        mode: RecursiveMode,
    ) -> Result<(), WatchError> {
        if !path.exists() {
            return Err(WatchError::watch_setup(path, WatchError::path_not_found(path)));
        }
        watcher
            .watch(path.as_std_path(), mode)
            .map_err(|e| WatchError::watch_setup(path, e))
    }

    /// Finds the deepest registered root containing `path`.
    fn origin_of(&self, path: &Utf8Path) -> Option<WatchHandle> {
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(slot, root)| root.as_deref().map(|root| (slot, root)))
            .filter(|(_, root)| path.starts_with(root))
            .max_by_key(|(_, root)| root.as_str().len())
            .map(|(slot, _)| WatchHandle::new(slot))
    }

    fn decode(
        &self,
        res: notify::Result<notify::Event>,
        batch: &mut EventBatch,
    ) -> Result<(), WatchError> {
        let event = res.map_err(|e| WatchError::AdapterRead(e.to_string()))?;
        let Some(kind) = map_kind(event.kind) else {
            tracing::trace!(kind = ?event.kind, "Ignoring unmapped event kind");
            return Ok(());
        };

        for path in event.paths {
            let path = match to_utf8(path) {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping event");
                    continue;
                }
            };
            let Some(name) = path.file_name() else {
                continue;
            };
            let mut raw = RawEvent::new(kind, name);
            if let Some(handle) = self.origin_of(&path) {
                raw = raw.with_hint(handle);
            }
            batch.push(raw);
        }
        Ok(())
    }
}

fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, WatchError> {
    Utf8PathBuf::try_from(path).map_err(|e| WatchError::non_utf8_path(e.into_path_buf()))
}

/// Maps a notify event kind onto the four kinds handlers can bind to.
///
/// Only reads count as access. Open and close notifications are dropped; a
/// write is already reported as a separate modify event.
fn map_kind(kind: notify::EventKind) -> Option<EventKind> {
    match kind {
        notify::EventKind::Create(_) => Some(EventKind::Create),
        notify::EventKind::Remove(_) => Some(EventKind::Delete),
        notify::EventKind::Access(AccessKind::Any | AccessKind::Read) => Some(EventKind::Access),
        notify::EventKind::Access(_) => None,
        notify::EventKind::Modify(_) => Some(EventKind::Modify),
        notify::EventKind::Any | notify::EventKind::Other => None,
    }
}

impl EventSource for NotifySource {
    fn register_paths(&mut self, paths: &[Utf8PathBuf]) -> Result<Vec<WatchHandle>, WatchError> {
        let mode = self.mode;
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatchError::invalid_state("event source is closed"));
        };

        let mut installed: Vec<&Utf8PathBuf> = Vec::with_capacity(paths.len());
        for path in paths {
            if let Err(err) = Self::watch_one(watcher, path, mode) {
                for done in installed {
                    let _ = watcher.unwatch(done.as_std_path());
                }
                return Err(err);
            }
            tracing::debug!(path = %path, "Installed OS watch");
            installed.push(path);
        }

        let first = self.roots.len();
        self.roots.extend(paths.iter().cloned().map(Some));
        Ok((first..self.roots.len()).map(WatchHandle::new).collect())
    }

    fn next_events(&mut self, timeout: Duration) -> Result<Option<EventBatch>, WatchError> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        let first = match self.rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => return Ok(Some(EventBatch::new())),
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        };

        let mut batch = EventBatch::new();
        self.decode(first, &mut batch)?;
        while let Ok(res) = self.rx.try_recv() {
            if let Err(err) = self.decode(res, &mut batch) {
                if batch.is_empty() {
                    return Err(err);
                }
                // Deliver what was already dequeued; fail on the next read.
                self.pending_error = Some(err);
                break;
            }
        }
        Ok(Some(batch))
    }

    fn unregister(&mut self, handles: &[WatchHandle]) -> Result<(), WatchError> {
        for handle in handles {
            let Some(root) = self.roots.get_mut(handle.slot()).and_then(Option::take) else {
                continue;
            };
            if let Some(watcher) = self.watcher.as_mut() {
                if let Err(err) = watcher.unwatch(root.as_std_path()) {
                    // The kernel drops watches on deleted paths by itself.
                    tracing::debug!(path = %root, error = %err, "Unwatch failed");
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), WatchError> {
        if self.watcher.take().is_some() {
            tracing::debug!("Closed OS watcher");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use notify::event::AccessMode;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().canonicalize().expect("canonicalize"))
            .expect("temp dir is UTF-8")
    }

    #[test]
    fn test_map_kind() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        assert_eq!(
            map_kind(notify::EventKind::Create(CreateKind::File)),
            Some(EventKind::Create)
        );
        assert_eq!(
            map_kind(notify::EventKind::Remove(RemoveKind::Any)),
            Some(EventKind::Delete)
        );
        assert_eq!(
            map_kind(notify::EventKind::Access(AccessKind::Any)),
            Some(EventKind::Access)
        );
        assert_eq!(
            map_kind(notify::EventKind::Access(AccessKind::Read)),
            Some(EventKind::Access)
        );
        assert_eq!(
            map_kind(notify::EventKind::Modify(ModifyKind::Any)),
            Some(EventKind::Modify)
        );
        assert_eq!(map_kind(notify::EventKind::Other), None);
        assert_eq!(map_kind(notify::EventKind::Any), None);
    }

    #[test]
    fn test_write_close_and_open_are_not_access() {
        for kind in [
            AccessKind::Close(AccessMode::Write),
            AccessKind::Close(AccessMode::Read),
            AccessKind::Open(AccessMode::Any),
            AccessKind::Open(AccessMode::Read),
        ] {
            assert_eq!(map_kind(notify::EventKind::Access(kind)), None, "{kind:?}");
        }
    }

    #[test]
    fn test_register_missing_path_fails() {
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        let err = source
            .register_paths(&[Utf8PathBuf::from("/nonexistent/path/that/does/not/exist")])
            .unwrap_err();
        assert!(matches!(err, WatchError::WatchSetup { .. }));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_register_rolls_back_on_failure() {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8_dir(&dir);
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");

        let result = source.register_paths(&[root.clone(), root.join("missing")]);
        assert!(result.is_err());
        assert!(source.roots.is_empty());

        let handles = source.register_paths(&[root]).expect("register");
        assert_eq!(handles, vec![WatchHandle::new(0)]);
    }

    #[test]
    fn test_origin_prefers_deepest_root() {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8_dir(&dir);
        let nested = root.join("nested");
        fs::create_dir(&nested).expect("mkdir");

        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        source
            .register_paths(&[root.clone(), nested.clone()])
            .expect("register");

        assert_eq!(source.origin_of(&root.join("a.txt")), Some(WatchHandle::new(0)));
        assert_eq!(source.origin_of(&nested.join("b.txt")), Some(WatchHandle::new(1)));
        assert_eq!(source.origin_of(Utf8Path::new("/elsewhere/c.txt")), None);
    }

    #[test]
    fn test_decode_uses_file_name_and_hint() {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8_dir(&dir);
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        source.register_paths(&[root.clone()]).expect("register");

        let event = notify::Event::new(notify::EventKind::Create(notify::event::CreateKind::File))
            .add_path(root.join("x.txt").into_std_path_buf());
        let mut batch = EventBatch::new();
        source.decode(Ok(event), &mut batch).expect("decode");

        assert_eq!(batch.len(), 1);
        let raw = &batch.events[0];
        assert_eq!(raw.name(), "x.txt");
        assert_eq!(raw.kind, EventKind::Create);
        assert_eq!(raw.path_hint, Some(WatchHandle::new(0)));
    }

    #[test]
    fn test_decode_error_is_adapter_read() {
        let source = NotifySource::new(&WatcherConfig::default()).expect("source");
        let mut batch = EventBatch::new();
        let err = source
            .decode(Err(notify::Error::generic("boom")), &mut batch)
            .unwrap_err();
        assert!(matches!(err, WatchError::AdapterRead(_)));
    }

    #[test]
    fn test_read_failure_after_decoded_events_is_deferred() {
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        let (tx, rx) = crossbeam_channel::unbounded();
        source.rx = rx;

        let created = notify::Event::new(notify::EventKind::Create(notify::event::CreateKind::File))
            .add_path(PathBuf::from("/somewhere/x.txt"));
        tx.send(Ok(created)).expect("send event");
        tx.send(Err(notify::Error::generic("queue overflow"))).expect("send error");

        let batch = source
            .next_events(Duration::from_millis(10))
            .expect("first read delivers the event")
            .expect("source open");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.events[0].name(), "x.txt");

        let err = source.next_events(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, WatchError::AdapterRead(ref m) if m.contains("queue overflow")));
    }

    #[test]
    fn test_read_failure_with_nothing_decoded_is_immediate() {
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        let (tx, rx) = crossbeam_channel::unbounded();
        source.rx = rx;

        tx.send(Err(notify::Error::generic("boom"))).expect("send error");
        let err = source.next_events(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, WatchError::AdapterRead(_)));
    }

    #[test]
    fn test_unregister_and_close_are_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        let handles = source.register_paths(&[utf8_dir(&dir)]).expect("register");

        source.unregister(&handles).expect("first unregister");
        source.unregister(&handles).expect("second unregister");
        source.close().expect("first close");
        source.close().expect("second close");

        assert!(source.roots.iter().all(Option::is_none));
    }

    #[test]
    fn test_receives_create_event() {
        let dir = TempDir::new().expect("temp dir");
        let mut source = NotifySource::new(&WatcherConfig::default()).expect("source");
        source.register_paths(&[utf8_dir(&dir)]).expect("register");

        fs::write(dir.path().join("created.txt"), "hello").expect("write");

        // Allow a few polls for the kernel to deliver.
        let mut names = Vec::new();
        for _ in 0..20 {
            if let Ok(Some(batch)) = source.next_events(Duration::from_millis(100)) {
                names.extend(batch.iter().map(|e| e.name().to_owned()));
            }
            if names.iter().any(|n| n == "created.txt") {
                break;
            }
        }
        source.close().expect("close");

        assert!(names.iter().any(|n| n == "created.txt"), "got {names:?}");
    }
}
