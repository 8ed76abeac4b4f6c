//! Conversation memory SDK facade.
//!
//! Bundles the Recall crates behind feature flags so downstream users can
//! enable only the components they need.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use recall_primitives as primitives;

/// Store, cache, and orchestrator (enabled by `memory` feature).
#[cfg(feature = "memory")]
pub use recall_memory as memory;

/// Importance-ranked compaction (enabled by `compaction` feature).
#[cfg(feature = "compaction")]
pub use recall_compaction as compaction;

/// Tracing bootstrap and metric accumulators (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use recall_telemetry as telemetry;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use recall_config as config;
