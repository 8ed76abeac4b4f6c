//! Importance-ranked compaction of conversation transcripts.
//!
//! The compressor is a pure function: it keeps the most recent messages
//! unconditionally and fills the rest of a token budget with the highest
//! TF-IDF scoring older messages, returning them in chronological order.

#![warn(missing_docs, clippy::pedantic)]

pub mod compressor;
pub mod tokens;

pub use compressor::{Compactable, CompactionReport, ImportanceCompressor, compress};
pub use tokens::{estimate_tokens, is_cjk, terms};
