//! Core types, errors, and configuration for the filewatch workspace.
//!
//! This crate holds the vocabulary shared by the watcher engine and the CLI:
//!
//! - [`EventKind`] - the four event kinds handlers can bind to
//! - [`Behavior`] - how a filter term is applied (include, exclude, ...)
//! - [`WatchOptions`] - watcher-wide option bit-set
//! - [`WatcherConfig`] - serializable runtime configuration
//! - [`ConfigError`] - configuration loading and validation errors

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Routing, WatcherConfig};
pub use error::ConfigError;
pub use types::{Behavior, EventKind, WatchOptions};
