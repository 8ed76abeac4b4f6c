//! Conversation memory for agents.
//!
//! [`MemoryOrchestrator`] writes every message to a durable [`MessageStore`]
//! first, keeps a bounded [`RecencyCache`] of each session's recent slice, and
//! rebuilds that slice through importance-ranked compaction whenever the cache
//! misses.

#![warn(missing_docs, clippy::pedantic)]

pub mod cache;
mod error;
pub mod journal;
mod locks;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod store;

pub use cache::{CacheConfig, CacheError, CacheResult, CacheStats, RecencyCache, TranscriptCache};
pub use error::{MemoryError, MemoryResult};
pub use journal::FileMessageStore;
pub use message::{Message, MessageBuilder};
pub use metrics::MetricsSnapshot;
pub use orchestrator::{MemoryOrchestrator, MemoryOrchestratorBuilder, OrchestratorConfig};
pub use recall_primitives::{MessageId, SessionKey};
pub use store::{InMemoryMessageStore, MessageStore};
