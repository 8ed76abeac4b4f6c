//! Shared error definitions for Recall primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided message identifier could not be parsed.
    #[error("invalid message id: {source}")]
    InvalidMessageId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Session key failed validation.
    #[error("invalid session key `{key}`: {reason}")]
    InvalidSessionKey {
        /// The offending key.
        key: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
