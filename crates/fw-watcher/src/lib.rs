//! Filesystem watching with per-path filters and handlers.
//!
//! Callers register directories, attach filename filters and one callback per
//! event kind to each, then start a background dispatch loop that reads raw
//! events from the OS and invokes the callbacks of every path whose filters
//! accept the event's filename.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────── caller ─────────────────────────┐
//! │  Watcher::watch(path) ─► PathBuilder ─► Registry         │
//! │  Watcher::start / stop                    │ Arc (frozen) │
//! └───────────────────────────────────────────│──────────────┘
//!                                             ▼
//! ┌──────────────── blocking thread (spawn_blocking) ────────┐
//! │  EventSource::next_events ─► Dispatcher ─► FilterSet     │
//! │  (notify / channel)              │             │ accept  │
//! │                                  └─────────────▼─────────│
//! │                                          handler(name)   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-watcher ──► fw-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use fw_core::{Behavior, WatcherConfig};
//! use fw_watcher::Watcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut watcher = Watcher::new(WatcherConfig::default())?;
//!     watcher
//!         .watch("./logs")?
//!         .filter_by_extension(Behavior::Include, [".log", ".txt"])?
//!         .filter_by_filename(Behavior::Exclude, "~")?
//!         .on_modified(|name| println!("modified: {name}"))
//!         .watch("./inbox")?
//!         .filter_by_predicate(|name| !name.starts_with('.'))
//!         .on_create(|name| println!("created: {name}"));
//!
//!     watcher.start(Behavior::Normal)?;
//!     tokio::signal::ctrl_c().await?;
//!     let stats = watcher.stop().await?;
//!     println!("{} events, {} handler calls", stats.events, stats.invocations);
//!     Ok(())
//! }
//! ```
//!
//! # Filter semantics
//!
//! Each category (extensions, filenames, predicates) accepts everything when
//! it has no rules. Positive rules within a category combine with OR, negative
//! rules with AND, predicates with OR. A name must pass every category.
//!
//! # Error Handling
//!
//! ```
//! use fw_watcher::WatchError;
//!
//! fn handle_watch_error(err: &WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {err}");
//!     } else {
//!         eprintln!("Warning: {err}");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod events;
pub mod filter;
pub mod registry;
pub mod source;
pub mod watcher;

// Re-export error types
pub use error::WatchError;

// Re-export event types
pub use events::{strip_padding, DispatchStats, EventBatch, RawEvent, WatchHandle};

// Re-export filter types
pub use filter::{FilterSet, IntoTerms, NameFilter};

// Re-export registry types
pub use registry::{Handler, PathBuilder, Registry};

// Re-export source types
pub use source::{ChannelSource, EventInjector, EventSource, NotifySource, PlatformSource};

// Re-export watcher types
pub use dispatch::Dispatcher;
pub use watcher::{Watcher, WatcherState};
