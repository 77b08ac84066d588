//! Event dispatch.
//!
//! [`Dispatcher`] routes decoded events to handlers; [`run_dispatch_loop`]
//! drives it from an [`EventSource`] until cancellation, source closure, or a
//! read failure.
//!
//! # Routing
//!
//! With [`Routing::FanOut`] every watched path is considered for every event,
//! because a single kernel queue is shared by all watches and the name alone
//! does not say which watch produced it. With [`Routing::ByOrigin`] an event
//! carrying a path hint only reaches the path that owns that handle.
//!
//! For each considered path the handler lookup comes first; filters are only
//! evaluated for paths that have a handler bound to the event's kind.

use std::sync::Arc;
use std::time::Duration;

use fw_core::{Routing, WatchOptions};
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::events::{DispatchStats, EventBatch, RawEvent, WatchHandle};
use crate::filter::NameFilter as _;
use crate::registry::{Registry, WatchedPath};
use crate::source::EventSource;

/// Emits a lifecycle message, at `info` when [`WatchOptions::DEBUG`] is set
/// and at `trace` otherwise.
pub(crate) fn trace_lifecycle(options: WatchOptions, stage: &'static str) {
    if options.is_debug() {
        tracing::info!(stage, "Watcher lifecycle");
    } else {
        tracing::trace!(stage, "Watcher lifecycle");
    }
}

/// Routes events to the handlers of a frozen registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    routing: Routing,
    origins: FxHashMap<WatchHandle, usize>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// `handles` are the handles returned by registering the registry's
    /// paths, in registry order; they back [`Routing::ByOrigin`].
    #[must_use]
    pub fn new(registry: Arc<Registry>, routing: Routing, handles: &[WatchHandle]) -> Self {
        let origins = handles
            .iter()
            .enumerate()
            .map(|(slot, handle)| (*handle, slot))
            .collect();
        Self {
            registry,
            routing,
            origins,
        }
    }

    /// Returns the registry being dispatched to.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn targets(&self, event: &RawEvent) -> &[WatchedPath] {
        let paths = self.registry.paths();
        if self.routing == Routing::ByOrigin {
            if let Some(&slot) = event.path_hint.and_then(|h| self.origins.get(&h)) {
                return &paths[slot..=slot];
            }
        }
        paths
    }

    /// Dispatches one event, invoking every matching handler synchronously.
    pub fn dispatch(&self, event: &RawEvent, stats: &mut DispatchStats) {
        let name = event.name();
        stats.events += 1;

        for watched in self.targets(event) {
            let config = watched.config();
            let Some(handler) = config.handlers.get(event.kind) else {
                continue;
            };
            if config.filters.accepts(name) {
                tracing::trace!(path = %watched.path(), kind = %event.kind, name, "Invoking handler");
                handler(name);
                stats.invocations += 1;
            } else {
                tracing::trace!(path = %watched.path(), kind = %event.kind, name, "Filtered out event");
                stats.rejected += 1;
            }
        }
    }

    /// Dispatches every event of a batch in order.
    pub fn dispatch_batch(&self, batch: &EventBatch, stats: &mut DispatchStats) {
        if batch.is_empty() {
            return;
        }
        stats.batches += 1;
        for event in batch {
            self.dispatch(event, stats);
        }
    }
}

/// Runs the dispatch loop on the current (blocking) thread.
///
/// Cancellation is checked at the top of every iteration, so a batch that was
/// already read is dispatched completely. When the loop ends, for any reason,
/// `handles` are unregistered and the source is closed before returning.
///
/// # Errors
///
/// Returns [`WatchError::AdapterRead`] if the source failed mid-loop.
#[allow(clippy::needless_pass_by_value)]
pub fn run_dispatch_loop<S: EventSource>(
    mut source: S,
    handles: Vec<WatchHandle>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    poll_interval: Duration,
) -> Result<DispatchStats, WatchError> {
    let options = dispatcher.registry().options();
    trace_lifecycle(options, "running");

    let mut stats = DispatchStats::default();
    let outcome = loop {
        if cancel.is_cancelled() {
            tracing::debug!("Dispatch loop observed cancellation");
            break Ok(());
        }
        match source.next_events(poll_interval) {
            Ok(Some(batch)) => dispatcher.dispatch_batch(&batch, &mut stats),
            Ok(None) => {
                tracing::debug!("Event source closed");
                break Ok(());
            }
            Err(err) => {
                tracing::error!(error = %err, "Event source read failed, stopping");
                break Err(err);
            }
        }
    };

    trace_lifecycle(options, "closing");
    if let Err(err) = source.unregister(&handles) {
        tracing::warn!(error = %err, "Failed to unregister watches");
    }
    if let Err(err) = source.close() {
        tracing::warn!(error = %err, "Failed to close event source");
    }

    tracing::info!(
        batches = stats.batches,
        events = stats.events,
        invocations = stats.invocations,
        "Dispatch loop stopped"
    );
    outcome.map(|()| stats)
}
