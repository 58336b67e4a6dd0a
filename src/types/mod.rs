//! Core types shared across the crate.
//!
//! - **Errors**: the dispatch error enum, its closed kind set, and the
//!   rejection delivered to callers
//! - **Config**: skill configuration, message table, observability settings

mod config;
mod errors;

pub use config::{Config, Messages, ObservabilityConfig};
pub use errors::{Error, ErrorKind, Rejection, Result};
