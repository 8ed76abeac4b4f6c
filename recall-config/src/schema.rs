//! Strongly typed configuration schemas.

use serde::{Deserialize, Serialize};

use crate::loader::{ConfigError, ConfigResult};

/// Root configuration for a memory orchestrator instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Recency cache bounds.
    pub cache: CacheSettings,
    /// Compaction budget used when rebuilding a session from the store.
    pub compaction: CompactionSettings,
    /// Store read sizing on cache miss.
    pub fallback: FallbackSettings,
}

impl RecallConfig {
    /// Checks that every bound is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be non-zero"));
        }
        if self.cache.max_messages_per_session == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_messages_per_session must be non-zero",
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be non-zero"));
        }
        if self.fallback.overfetch_factor == 0 {
            return Err(ConfigError::Invalid(
                "fallback.overfetch_factor must be non-zero",
            ));
        }
        if self.fallback.max_fetch == 0 {
            return Err(ConfigError::Invalid("fallback.max_fetch must be non-zero"));
        }
        Ok(())
    }
}

/// Bounds for the per-session recency cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of distinct sessions held at once.
    pub capacity: usize,
    /// Maximum number of messages retained per session.
    pub max_messages_per_session: usize,
    /// Sliding time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_messages_per_session: 50,
            ttl_secs: 900,
        }
    }
}

/// Token budget applied by the importance compressor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionSettings {
    /// Maximum estimated tokens kept after compaction.
    pub max_tokens: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self { max_tokens: 4000 }
    }
}

/// Sizing of the durable-store read performed on a cache miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Multiplier applied to the requested message count.
    pub overfetch_factor: usize,
    /// Hard cap on raw messages fetched per fallback.
    pub max_fetch: usize,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            overfetch_factor: 2,
            max_fetch: 100,
        }
    }
}
