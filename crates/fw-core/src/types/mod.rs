//! Domain types shared across the workspace.
//!
//! - [`kind`] - event kinds a handler can be bound to
//! - [`behavior`] - filter behaviors
//! - [`options`] - watcher-wide option flags
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use fw_core::{Behavior, EventKind, WatchOptions};
//! ```

mod behavior;
mod kind;
mod options;

pub use behavior::Behavior;
pub use kind::EventKind;
pub use options::WatchOptions;
