//! Core shared types for the Recall conversation memory subsystem.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifiers for sessions and the messages recorded under them.
pub use ids::{MessageId, SessionKey};
