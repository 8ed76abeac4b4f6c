//! Error types for the memory subsystem.

use serde_json::Error as SerdeError;
use thiserror::Error;

use recall_primitives::SessionKey;

/// Errors emitted by memory components.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The provided configuration was invalid.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(&'static str),
    /// The durable store rejected an append; nothing was cached.
    #[error("durable write failed for session `{session}`: {reason}")]
    DurableWrite {
        /// Session the message belonged to.
        session: SessionKey,
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// The durable store failed a read, search, or clear.
    #[error("message store error: {reason}")]
    Store {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// Underlying I/O failure while reading or writing transcript files.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// The orchestrator was built without a message store.
    #[error("message store not configured")]
    MissingStore,
}

impl MemoryError {
    /// Helper to construct store errors from string-like values.
    #[must_use]
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    /// Reclassifies a failed append as a [`MemoryError::DurableWrite`].
    #[must_use]
    pub fn into_durable_write(self, session: &SessionKey) -> Self {
        match self {
            Self::DurableWrite { .. } => self,
            other => Self::DurableWrite {
                session: session.clone(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
