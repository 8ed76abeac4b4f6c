//! Observability utilities for the memory subsystem.

#![warn(missing_docs, clippy::pedantic)]

pub mod metrics;
pub mod tracing_support;

pub use metrics::{HitCounter, RunningMean};
pub use tracing_support::init_tracing;
