//! # ArgusDB Core
//!
//! Root configuration and engine lifecycle. `ArgusDb` assembles the record
//! store, cache tiers, query executor and export manager, starts their
//! background maintenance tasks, and tears everything down gracefully on
//! shutdown.

mod config;
mod engine;

pub use config::{ArgusConfig, ExportConfig};
pub use engine::ArgusDb;
