//! The [`Watcher`] lifecycle.
//!
//! A watcher owns a [`Registry`] and an [`EventSource`], and moves through
//! three states:
//!
//! ```text
//!            start(Normal)              stop() / read failure
//!   Idle ───────────────────► Running ───────────────────────► Stopped
//!    │  ▲                                                          ▲
//!    │  └── setup failure                                          │
//!    └─────────────────────────── stop() ──────────────────────────┘
//! ```
//!
//! Configuration is only accepted while `Idle`. `start` registers every
//! watched path with the source and moves the source into a
//! `spawn_blocking` task running [`run_dispatch_loop`]. `stop` cancels that
//! task and awaits it, so every watch is released by the time it returns.

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::{Behavior, WatchOptions, WatcherConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{run_dispatch_loop, trace_lifecycle, Dispatcher};
use crate::error::WatchError;
use crate::events::DispatchStats;
use crate::registry::{PathBuilder, Registry};
use crate::source::{EventSource, NotifySource, PlatformSource};

/// Observable state of a [`Watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherState {
    /// Accepting configuration; nothing is registered with the OS.
    Idle,
    /// The dispatch loop is running.
    Running,
    /// The loop has exited. Terminal.
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

enum Lifecycle<S> {
    Idle(S),
    Running {
        cancel: CancellationToken,
        task: JoinHandle<Result<DispatchStats, WatchError>>,
    },
    Stopped,
}

/// A filesystem watcher dispatching filtered events to per-path handlers.
///
/// `S` is the event backend; it defaults to [`PlatformSource`].
///
/// # Examples
///
/// ```no_run
/// use fw_core::{Behavior, WatcherConfig};
/// use fw_watcher::Watcher;
///
/// # async fn example() -> Result<(), fw_watcher::WatchError> {
/// let mut watcher = Watcher::new(WatcherConfig::default())?;
/// watcher
///     .watch("/srv/inbox")?
///     .filter_by_extension(Behavior::Include, ".csv")?
///     .on_create(|name| println!("new upload: {name}"));
///
/// watcher.start(Behavior::Normal)?;
/// // ...
/// let stats = watcher.stop().await?;
/// println!("{} handler calls", stats.invocations);
/// # Ok(())
/// # }
/// ```
pub struct Watcher<S: EventSource = PlatformSource> {
    registry: Arc<Registry>,
    config: WatcherConfig,
    lifecycle: Lifecycle<S>,
}

impl<S: EventSource> fmt::Debug for Watcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("state", &self.state())
            .field("paths", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Watcher<PlatformSource> {
    /// Creates a watcher on the platform backend.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] if `config` is invalid and
    /// [`WatchError::Notify`] if the OS watcher cannot be created.
    pub fn new(config: WatcherConfig) -> Result<Self, WatchError> {
        config.validate()?;
        let source = NotifySource::new(&config)?;
        Self::with_source(source, config)
    }
}

impl<S: EventSource> Watcher<S> {
    /// Creates a watcher on a caller-supplied backend.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] if `config` is invalid.
    pub fn with_source(source: S, config: WatcherConfig) -> Result<Self, WatchError> {
        config.validate()?;
        let options = config.options();
        trace_lifecycle(options, "constructing");
        Ok(Self {
            registry: Arc::new(Registry::with_options(options)),
            config,
            lifecycle: Lifecycle::Idle(source),
        })
    }

    fn registry_mut(&mut self) -> Result<&mut Registry, WatchError> {
        let state = self.state();
        if state != WatcherState::Idle {
            return Err(WatchError::invalid_state(format!(
                "cannot configure a {state} watcher"
            )));
        }
        Arc::get_mut(&mut self.registry)
            .ok_or_else(|| WatchError::invalid_state("registry is shared with a dispatch loop"))
    }

    /// Registers `path` and returns a builder scoped to it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] unless the watcher is idle; see
    /// also [`Registry::watch`].
    pub fn watch(&mut self, path: impl AsRef<Utf8Path>) -> Result<PathBuilder<'_>, WatchError> {
        self.registry_mut()?.watch(path)
    }

    /// Returns a builder for a path that is already watched.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] unless the watcher is idle and
    /// `path` was watched before.
    pub fn configure(&mut self, path: impl AsRef<Utf8Path>) -> Result<PathBuilder<'_>, WatchError> {
        self.registry_mut()?.configure(path)
    }

    /// ORs `option` into the watcher-wide options.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::InvalidState`] unless the watcher is idle.
    pub fn set_option(&mut self, option: WatchOptions) -> Result<(), WatchError> {
        self.registry_mut()?.set_option(option);
        Ok(())
    }

    /// Registers every watched path and launches the dispatch loop.
    ///
    /// Must be called from within a tokio runtime. On failure the watcher
    /// stays idle and nothing remains registered.
    ///
    /// # Errors
    ///
    /// - [`WatchError::InvalidState`] if `behavior` is not
    ///   [`Behavior::Normal`], the watcher is not idle, or no runtime is
    ///   available
    /// - [`WatchError::WatchSetup`] if a path cannot be observed
    pub fn start(&mut self, behavior: Behavior) -> Result<(), WatchError> {
        if behavior != Behavior::Normal {
            return Err(WatchError::invalid_state(format!(
                "{behavior:?} is a filter behavior; start with Behavior::Normal"
            )));
        }
        let state = self.state();
        if state != WatcherState::Idle {
            return Err(WatchError::invalid_state(format!(
                "cannot start a {state} watcher"
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WatchError::invalid_state(format!("no tokio runtime: {e}")))?;

        let Lifecycle::Idle(mut source) = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
        else {
            return Err(WatchError::invalid_state("watcher has no idle source"));
        };

        let options = self.registry.options();
        trace_lifecycle(options, "starting");

        let paths: Vec<Utf8PathBuf> = self.watched_paths().map(Utf8Path::to_owned).collect();
        let handles = match source.register_paths(&paths) {
            Ok(handles) => handles,
            Err(err) => {
                tracing::warn!(error = %err, "Watch setup failed, watcher stays idle");
                self.lifecycle = Lifecycle::Idle(source);
                return Err(err);
            }
        };

        let dispatcher = Dispatcher::new(Arc::clone(&self.registry), self.config.routing, &handles);
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let poll_interval = self.config.poll_interval();
        let task = runtime.spawn_blocking(move || {
            run_dispatch_loop(source, handles, dispatcher, loop_cancel, poll_interval)
        });

        tracing::info!(
            paths = paths.len(),
            routing = ?self.config.routing,
            "File watcher started"
        );
        self.lifecycle = Lifecycle::Running { cancel, task };
        Ok(())
    }

    /// Stops the dispatch loop and waits for it to release its watches.
    ///
    /// Returns the loop's statistics. Stopping an idle watcher closes its
    /// source; stopping a stopped watcher does nothing. Events already read
    /// when cancellation is requested are still dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AdapterRead`] if the loop ended on a read
    /// failure.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a handler that panicked on the loop thread.
    pub async fn stop(&mut self) -> Result<DispatchStats, WatchError> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(mut source) => {
                trace_lifecycle(self.registry.options(), "closing");
                source.close()?;
                Ok(DispatchStats::default())
            }
            Lifecycle::Running { cancel, task } => {
                cancel.cancel();
                match task.await {
                    Ok(result) => result,
                    Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                    Err(_join_error) => Err(WatchError::ChannelClosed),
                }
            }
            Lifecycle::Stopped => {
                tracing::debug!("stop() on a stopped watcher");
                Ok(DispatchStats::default())
            }
        }
    }

    /// Returns the current state.
    ///
    /// A loop that ended on its own (read failure, handler panic, source
    /// closed) reports [`WatcherState::Stopped`] before `stop` is called.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        match &self.lifecycle {
            Lifecycle::Idle(_) => WatcherState::Idle,
            Lifecycle::Running { task, .. } if task.is_finished() => WatcherState::Stopped,
            Lifecycle::Running { .. } => WatcherState::Running,
            Lifecycle::Stopped => WatcherState::Stopped,
        }
    }

    /// Returns `true` while the dispatch loop is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }

    /// Returns the watched paths in first-watched order.
    pub fn watched_paths(&self) -> impl Iterator<Item = &Utf8Path> {
        self.registry.paths().iter().map(|p| p.path())
    }

    /// Returns the watcher-wide options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> WatchOptions {
        self.registry.options()
    }

    /// Returns the configuration the watcher was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Returns the registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl<S: EventSource> Drop for Watcher<S> {
    fn drop(&mut self) {
        // Drop is sync, so the task is not awaited. It releases its watches
        // once it observes the cancellation.
        if let Lifecycle::Running { cancel, .. } = &self.lifecycle {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RawEvent, WatchHandle};
    use crate::source::{ChannelSource, EventInjector};
    use fw_core::{EventKind, Routing};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> WatcherConfig {
        WatcherConfig {
            poll_interval_ms: 10,
            ..WatcherConfig::default()
        }
    }

    fn channel_watcher(config: WatcherConfig) -> (Watcher<ChannelSource>, EventInjector) {
        let (source, injector) = ChannelSource::new();
        (Watcher::with_source(source, config).unwrap(), injector)
    }

    fn sender(
        tx: &mpsc::UnboundedSender<String>,
        tag: &'static str,
    ) -> impl Fn(&str) + Send + Sync + 'static {
        let tx = tx.clone();
        move |name: &str| {
            let _ = tx.send(format!("{tag}:{name}"));
        }
    }

    async fn wait_until_stopped<S: EventSource>(watcher: &Watcher<S>) {
        tokio::time::timeout(WAIT, async {
            while watcher.state() != WatcherState::Stopped {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_invokes_handler_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut watcher, injector) = channel_watcher(fast_config());
        watcher
            .watch("/p")
            .unwrap()
            .filter_by_extension(Behavior::Include, ".txt")
            .unwrap()
            .on_create(sender(&tx, "p"));

        watcher.start(Behavior::Normal).unwrap();
        assert!(watcher.is_running());
        injector.send(RawEvent::new(EventKind::Create, "x.txt")).unwrap();

        let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("p:x.txt"));

        let stats = watcher.stop().await.unwrap();
        assert_eq!(stats.invocations, 1);
        assert_eq!(watcher.state(), WatcherState::Stopped);
        assert!(injector.is_source_closed());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_invocations_after_stop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut watcher, injector) = channel_watcher(fast_config());
        watcher.watch("/p").unwrap().on_create(sender(&tx, "p"));

        watcher.start(Behavior::Normal).unwrap();
        watcher.stop().await.unwrap();

        assert!(matches!(
            injector.send(RawEvent::new(EventKind::Create, "late.txt")),
            Err(WatchError::ChannelClosed)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_failure_stops_loop_and_surfaces_from_stop() {
        let (mut watcher, injector) = channel_watcher(fast_config());
        watcher.watch("/p").unwrap().on_delete(|_| {});
        watcher.start(Behavior::Normal).unwrap();

        injector.fail("event queue overflow").unwrap();
        wait_until_stopped(&watcher).await;
        assert!(injector.is_source_closed());

        let err = watcher.stop().await.unwrap_err();
        assert!(matches!(err, WatchError::AdapterRead(ref m) if m.contains("overflow")));
    }

    #[tokio::test]
    async fn test_setup_failure_stays_idle() {
        let (source, _injector) = ChannelSource::new();
        let source = source.with_unobservable("/missing");
        let mut watcher = Watcher::with_source(source, fast_config()).unwrap();
        watcher.watch("/ok").unwrap().watch("/missing").unwrap();

        let err = watcher.start(Behavior::Normal).unwrap_err();
        assert!(matches!(err, WatchError::WatchSetup { .. }));
        assert_eq!(err.path().map(|p| p.as_str()), Some("/missing"));
        assert_eq!(watcher.state(), WatcherState::Idle);

        watcher.configure("/ok").unwrap().on_create(|_| {});
    }

    #[tokio::test]
    async fn test_configuration_after_start_is_invalid_state() {
        let (mut watcher, _injector) = channel_watcher(fast_config());
        watcher.watch("/p").unwrap();
        watcher.start(Behavior::Normal).unwrap();

        assert!(matches!(
            watcher.watch("/q"),
            Err(WatchError::InvalidState { .. })
        ));
        assert!(matches!(
            watcher.configure("/p"),
            Err(WatchError::InvalidState { .. })
        ));
        assert!(matches!(
            watcher.set_option(WatchOptions::DEBUG),
            Err(WatchError::InvalidState { .. })
        ));

        watcher.stop().await.unwrap();
        assert!(matches!(
            watcher.watch("/q"),
            Err(WatchError::InvalidState { .. })
        ));
        assert_eq!(watcher.watched_paths().count(), 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let (mut watcher, _injector) = channel_watcher(fast_config());
        watcher.start(Behavior::Normal).unwrap();
        let err = watcher.start(Behavior::Normal).unwrap_err();
        assert!(err.to_string().contains("running"));
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_behavior_is_not_a_start_behavior() {
        let (mut watcher, _injector) = channel_watcher(fast_config());
        for behavior in [Behavior::Include, Behavior::Exclude, Behavior::Equal, Behavior::Unequal] {
            assert!(matches!(
                watcher.start(behavior),
                Err(WatchError::InvalidState { .. })
            ));
        }
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[test]
    fn test_start_without_runtime_stays_idle() {
        let (mut watcher, _injector) = channel_watcher(fast_config());
        watcher.watch("/p").unwrap();
        let err = watcher.start(Behavior::Normal).unwrap_err();
        assert!(err.to_string().contains("runtime"));
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut watcher, injector) = channel_watcher(fast_config());
        watcher.watch("/p").unwrap();
        watcher.start(Behavior::Normal).unwrap();

        watcher.stop().await.unwrap();
        let again = watcher.stop().await.unwrap();
        assert_eq!(again, DispatchStats::default());
        assert!(injector.is_source_closed());
    }

    #[tokio::test]
    async fn test_stop_idle_closes_source() {
        let (mut watcher, injector) = channel_watcher(fast_config());
        watcher.stop().await.unwrap();
        assert!(injector.is_source_closed());
        assert_eq!(watcher.state(), WatcherState::Stopped);
        assert!(watcher.start(Behavior::Normal).is_err());
    }

    #[tokio::test]
    async fn test_by_origin_routes_to_owning_path() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = WatcherConfig {
            routing: Routing::ByOrigin,
            ..fast_config()
        };
        let (mut watcher, injector) = channel_watcher(config);
        watcher
            .watch("/a")
            .unwrap()
            .on_create(sender(&tx, "a"))
            .watch("/b")
            .unwrap()
            .on_create(sender(&tx, "b"));
        watcher.start(Behavior::Normal).unwrap();

        injector
            .send(RawEvent::new(EventKind::Create, "x").with_hint(WatchHandle::new(1)))
            .unwrap();
        let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("b:x"));

        let stats = watcher.stop().await.unwrap();
        assert_eq!(stats.invocations, 1);
    }

    #[tokio::test]
    #[should_panic(expected = "handler exploded")]
    async fn test_handler_panic_propagates_through_stop() {
        let (mut watcher, injector) = channel_watcher(fast_config());
        watcher
            .watch("/p")
            .unwrap()
            .on_modified(|_| panic!("handler exploded"));
        watcher.start(Behavior::Normal).unwrap();

        injector.send(RawEvent::new(EventKind::Modify, "f")).unwrap();
        wait_until_stopped(&watcher).await;
        let _ = watcher.stop().await;
    }

    #[tokio::test]
    async fn test_debug_option_via_config() {
        let config = WatcherConfig {
            debug: true,
            ..fast_config()
        };
        let (watcher, _injector) = channel_watcher(config);
        assert!(watcher.options().is_debug());
        assert!(format!("{watcher:?}").contains("Idle"));
    }

    #[tokio::test]
    async fn test_platform_watcher_reports_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = Watcher::new(fast_config()).unwrap();
        watcher
            .watch(&root)
            .unwrap()
            .filter_by_extension(Behavior::Include, ".txt")
            .unwrap()
            .on_create(sender(&tx, "root"));
        watcher.start(Behavior::Normal).unwrap();

        std::fs::write(root.join("skipped.log"), b"x").unwrap();
        std::fs::write(root.join("hello.txt"), b"x").unwrap();

        let got = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("root:hello.txt"));
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_platform_watcher_missing_path_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Utf8PathBuf::try_from(dir.path().join("gone")).unwrap();

        let mut watcher = Watcher::new(fast_config()).unwrap();
        watcher.watch(&missing).unwrap();
        let err = watcher.start(Behavior::Normal).unwrap_err();
        assert!(matches!(err, WatchError::WatchSetup { .. }));
        assert_eq!(watcher.state(), WatcherState::Idle);
    }
}
