//! Configuration management for the memory subsystem.
//!
//! Settings are plain serde structs with defaults for every field, loaded from
//! JSON and then overridden by `RECALL_*` environment variables.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigResult, load_from_env, load_from_path, load_from_str};
pub use schema::{CacheSettings, CompactionSettings, FallbackSettings, RecallConfig};
