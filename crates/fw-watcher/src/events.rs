//! Raw event records and dispatch statistics.
//!
//! An event source reports [`RawEvent`]s grouped in an [`EventBatch`] per
//! read. The dispatch loop decodes each record, fans it out to the watched
//! paths, and accumulates [`DispatchStats`].
//!
//! # Event Flow
//!
//! ```text
//! OS notification (inotify / FSEvents / ReadDirectoryChangesW)
//!        │
//!        ▼
//!   EventSource::next_events  ──►  EventBatch { RawEvent, ... }
//!        │
//!        ▼
//!   Dispatcher (per event, per watched path: handler? filters? invoke)
//! ```

use fw_core::EventKind;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::Instant;

/// Opaque identifier of one path registration inside an event source.
///
/// Handles are returned by
/// [`EventSource::register_paths`](crate::EventSource::register_paths), one
/// per input path, and may be attached to events as an origin hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(usize);

impl WatchHandle {
    /// Creates a handle from a backend-specific slot number.
    #[inline]
    #[must_use]
    pub const fn new(slot: usize) -> Self {
        Self(slot)
    }

    /// Returns the backend-specific slot number.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0
    }
}

/// Strips trailing NUL padding from a name reported by the kernel.
///
/// inotify pads names to an alignment boundary with NUL bytes.
///
/// # Examples
///
/// ```
/// use fw_watcher::strip_padding;
///
/// assert_eq!(strip_padding("a.txt\0\0\0"), "a.txt");
/// assert_eq!(strip_padding("a.txt"), "a.txt");
/// ```
#[inline]
#[must_use]
pub fn strip_padding(name: &str) -> &str {
    name.trim_end_matches('\0')
}

/// One event record as reported by an event source.
///
/// # Examples
///
/// ```
/// use fw_core::EventKind;
/// use fw_watcher::RawEvent;
///
/// let event = RawEvent::new(EventKind::Create, "x.txt\0\0");
/// assert_eq!(event.name(), "x.txt");
/// assert!(event.path_hint.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// The registration that produced this event, if the backend knows it.
    pub path_hint: Option<WatchHandle>,

    /// What happened.
    pub kind: EventKind,

    /// The file name as reported, possibly with trailing padding.
    pub raw_name: String,
}

impl RawEvent {
    /// Creates an event without an origin hint.
    #[must_use]
    pub fn new(kind: EventKind, name: impl Into<String>) -> Self {
        Self {
            path_hint: None,
            kind,
            raw_name: name.into(),
        }
    }

    /// Attaches an origin hint.
    #[must_use]
    pub fn with_hint(mut self, handle: WatchHandle) -> Self {
        self.path_hint = Some(handle);
        self
    }

    /// Returns the file name with trailing padding removed.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        strip_padding(&self.raw_name)
    }
}

/// A group of events returned by a single source read.
///
/// Uses [`SmallVec`] with inline storage for up to 8 events, avoiding heap
/// allocation for the common small read.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// The events in this batch, in the order the source reported them.
    pub events: SmallVec<[RawEvent; 8]>,

    /// When the batch was read.
    pub received_at: Instant,
}

impl EventBatch {
    /// Creates a new empty batch.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: SmallVec::new(),
            received_at: Instant::now(),
        }
    }

    /// Creates a batch from a sequence of events.
    #[inline]
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = RawEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            received_at: Instant::now(),
        }
    }

    /// Adds an event to the batch.
    #[inline]
    pub fn push(&mut self, event: RawEvent) {
        self.events.push(event);
    }

    /// Returns the number of events in this batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the batch contains no events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns an iterator over the events.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RawEvent> {
        self.events.iter()
    }
}

impl Default for EventBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoIterator for EventBatch {
    type Item = RawEvent;
    type IntoIter = smallvec::IntoIter<[RawEvent; 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventBatch {
    type Item = &'a RawEvent;
    type IntoIter = std::slice::Iter<'a, RawEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl FromIterator<RawEvent> for EventBatch {
    fn from_iter<T: IntoIterator<Item = RawEvent>>(iter: T) -> Self {
        Self::from_events(iter)
    }
}

/// Counters accumulated by the dispatch loop over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Non-empty batches read from the source.
    pub batches: u64,

    /// Events decoded from those batches.
    pub events: u64,

    /// Handler invocations.
    pub invocations: u64,

    /// (event, path) pairs with a bound handler whose filters rejected the name.
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_padding_only_trailing() {
        assert_eq!(strip_padding("\0a\0b\0\0"), "\0a\0b");
        assert_eq!(strip_padding("\0\0"), "");
        assert_eq!(strip_padding(""), "");
    }

    #[test]
    fn test_raw_event_hint() {
        let event = RawEvent::new(EventKind::Delete, "gone").with_hint(WatchHandle::new(3));
        assert_eq!(event.path_hint.map(WatchHandle::slot), Some(3));
        assert_eq!(event.kind, EventKind::Delete);
    }

    #[test]
    fn test_batch_collects_in_order() {
        let batch: EventBatch = ["a", "b", "c"]
            .into_iter()
            .map(|n| RawEvent::new(EventKind::Modify, n))
            .collect();
        assert_eq!(batch.len(), 3);
        let names: Vec<_> = batch.iter().map(RawEvent::name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_batch() {
        let batch = EventBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.into_iter().count(), 0);
    }

    #[test]
    fn test_dispatch_stats_snapshot() {
        let stats = DispatchStats {
            batches: 2,
            events: 5,
            invocations: 3,
            rejected: 1,
        };
        insta::assert_json_snapshot!(stats, @r#"
        {
          "batches": 2,
          "events": 5,
          "invocations": 3,
          "rejected": 1
        }
        "#);
    }
}
