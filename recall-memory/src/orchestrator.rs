//! Coordinates the durable store, the recency cache, and compaction.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use recall_compaction::ImportanceCompressor;
use recall_config::RecallConfig;
use recall_primitives::SessionKey;
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheResult, RecencyCache, TranscriptCache};
use crate::locks::KeyLocks;
use crate::message::Message;
use crate::metrics::{MemoryMetrics, MetricsSnapshot};
use crate::store::MessageStore;
use crate::{MemoryError, MemoryResult};

/// Most-recent messages always kept by a fallback compaction.
const FALLBACK_MIN_KEEP: usize = 2;

/// Tuning for a [`MemoryOrchestrator`].
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    cache: CacheConfig,
    max_tokens: usize,
    overfetch_factor: NonZeroUsize,
    max_fetch: NonZeroUsize,
}

impl OrchestratorConfig {
    /// Sets the cache configuration used when no cache is injected.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the token budget for fallback compaction.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets how many raw messages to read per requested message on a miss.
    #[must_use]
    pub fn with_overfetch_factor(mut self, factor: NonZeroUsize) -> Self {
        self.overfetch_factor = factor;
        self
    }

    /// Caps the raw messages read per fallback.
    #[must_use]
    pub fn with_max_fetch(mut self, max_fetch: NonZeroUsize) -> Self {
        self.max_fetch = max_fetch;
        self
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn cache(self) -> CacheConfig {
        self.cache
    }

    /// Returns the compaction token budget.
    #[must_use]
    pub const fn max_tokens(self) -> usize {
        self.max_tokens
    }

    /// Store read size for a request of `n` messages.
    #[must_use]
    pub fn fetch_limit(self, n: usize) -> usize {
        n.saturating_mul(self.overfetch_factor.get())
            .min(self.max_fetch.get())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            max_tokens: 4000,
            overfetch_factor: NonZeroUsize::new(2).expect("non-zero"),
            max_fetch: NonZeroUsize::new(100).expect("non-zero"),
        }
    }
}

impl TryFrom<&RecallConfig> for OrchestratorConfig {
    type Error = MemoryError;

    fn try_from(config: &RecallConfig) -> MemoryResult<Self> {
        let non_zero = |value: usize, field: &'static str| {
            NonZeroUsize::new(value).ok_or(MemoryError::InvalidConfig(field))
        };

        if config.cache.ttl_secs == 0 {
            return Err(MemoryError::InvalidConfig("cache.ttl_secs must be non-zero"));
        }

        let cache = CacheConfig::new(non_zero(
            config.cache.capacity,
            "cache.capacity must be non-zero",
        )?)
        .with_max_messages(non_zero(
            config.cache.max_messages_per_session,
            "cache.max_messages_per_session must be non-zero",
        )?)
        .with_ttl(Duration::from_secs(config.cache.ttl_secs));

        Ok(Self {
            cache,
            max_tokens: config.compaction.max_tokens,
            overfetch_factor: non_zero(
                config.fallback.overfetch_factor,
                "fallback.overfetch_factor must be non-zero",
            )?,
            max_fetch: non_zero(
                config.fallback.max_fetch,
                "fallback.max_fetch must be non-zero",
            )?,
        })
    }
}

/// Builder for [`MemoryOrchestrator`] instances.
pub struct MemoryOrchestratorBuilder {
    config: OrchestratorConfig,
    store: Option<Arc<dyn MessageStore>>,
    cache: Option<Arc<dyn TranscriptCache>>,
}

impl MemoryOrchestratorBuilder {
    /// Starts a new builder using the supplied config.
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            store: None,
            cache: None,
        }
    }

    /// Installs the durable store. This is required before calling [`build`](Self::build).
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default [`RecencyCache`].
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn TranscriptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the [`MemoryOrchestrator`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::MissingStore`] when no store was provided.
    pub fn build(self) -> MemoryResult<MemoryOrchestrator> {
        let store = self.store.ok_or(MemoryError::MissingStore)?;
        let config = self.config;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(RecencyCache::new(config.cache())));

        Ok(MemoryOrchestrator {
            store,
            cache,
            compressor: ImportanceCompressor::new(config.max_tokens()),
            config,
            locks: Arc::new(KeyLocks::new(config.cache().capacity().get())),
            metrics: Arc::new(MemoryMetrics::default()),
        })
    }
}

/// The memory API: durable appends, cached recent reads, search, and metrics.
///
/// Cloning is cheap and clones share the cache, locks, and metrics.
#[derive(Clone)]
pub struct MemoryOrchestrator {
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn TranscriptCache>,
    compressor: ImportanceCompressor,
    config: OrchestratorConfig,
    locks: Arc<KeyLocks>,
    metrics: Arc<MemoryMetrics>,
}

impl MemoryOrchestrator {
    /// Creates a builder for an orchestrator.
    #[must_use]
    pub fn builder(config: OrchestratorConfig) -> MemoryOrchestratorBuilder {
        MemoryOrchestratorBuilder::new(config)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> OrchestratorConfig {
        self.config
    }

    /// Returns the cache in use.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn TranscriptCache> {
        &self.cache
    }

    /// Returns the durable store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Durably records `message`, then appends it to the cached slice.
    ///
    /// Appends to one session are serialised, so the cached slice keeps the
    /// store's order.
    ///
    /// A cache failure after the durable write is not reported; the session
    /// is invalidated so the next read rebuilds it from the store.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::DurableWrite`] when the store rejects the
    /// message. The cache is left untouched in that case.
    pub async fn append(&self, message: Message) -> MemoryResult<()> {
        let session = message.session_key().clone();
        // Held across the durable write so the store and the cache see appends
        // to a session in the same order.
        let _guard = self.locks.acquire(&session).await;
        self.store
            .append(&message)
            .await
            .map_err(|err| err.into_durable_write(&session))?;

        if let Err(err) = self.push_cached(&session, message) {
            warn!(
                session = %session,
                error = %err,
                "cache refresh failed after append; invalidating"
            );
            self.cache.invalidate(&session);
        }
        Ok(())
    }

    fn push_cached(&self, session: &SessionKey, message: Message) -> CacheResult<()> {
        let mut messages = self.cache.get(session)?.unwrap_or_default();
        // A fallback racing this append may already have read it from the store.
        if !messages.iter().any(|cached| cached.id() == message.id()) {
            messages.push(message);
        }
        self.cache.put(session, messages)
    }

    /// Returns up to `n` of the session's most recent messages, oldest first.
    ///
    /// Served from the cache when possible; otherwise over-fetches from the
    /// store, compacts to the token budget, and repopulates the cache.
    ///
    /// # Errors
    ///
    /// Propagates store errors from the fallback path.
    pub async fn load_recent(&self, session: &SessionKey, n: usize) -> MemoryResult<Vec<Message>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        match self.cache.get(session) {
            Ok(Some(messages)) => {
                self.metrics.hit();
                debug!(
                    session = %session,
                    cached = messages.len(),
                    "recent history served from cache"
                );
                return Ok(tail(messages, n));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(session = %session, error = %err, "cache read failed; invalidating");
                self.cache.invalidate(session);
            }
        }

        self.fallback(session, n).await
    }

    async fn fallback(&self, session: &SessionKey, n: usize) -> MemoryResult<Vec<Message>> {
        let _guard = self.locks.acquire(session).await;

        // Another reader may have rebuilt the entry while we waited.
        match self.cache.get(session) {
            Ok(Some(messages)) => {
                self.metrics.hit();
                debug!(
                    session = %session,
                    cached = messages.len(),
                    "recent history rebuilt by a concurrent reader"
                );
                return Ok(tail(messages, n));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(session = %session, error = %err, "cache read failed; invalidating");
                self.cache.invalidate(session);
            }
        }

        self.metrics.miss();
        let started = Instant::now();

        let limit = self.config.fetch_limit(n);
        let fetched = self.store.load_recent(session, limit).await?;
        if fetched.is_empty() {
            self.metrics.record_fallback(started.elapsed(), None);
            debug!(session = %session, "fallback found no stored history");
            return Ok(Vec::new());
        }

        let min_keep = n.min(FALLBACK_MIN_KEEP);
        let (compressed, report) = self.compressor.compress_with_report(&fetched, min_keep);

        if let Err(err) = self.cache.put(session, compressed.clone()) {
            warn!(session = %session, error = %err, "cache repopulation failed; invalidating");
            self.cache.invalidate(session);
        }

        let elapsed = started.elapsed();
        self.metrics.record_fallback(elapsed, Some(report.ratio()));
        debug!(
            session = %session,
            fetched = report.input_messages,
            kept = report.output_messages,
            tokens_before = report.input_tokens,
            tokens_after = report.output_tokens,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "rebuilt recent history from store"
        );

        Ok(tail(compressed, n))
    }

    /// Searches the session's full transcript. The cache is not consulted.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn search(
        &self,
        query: &str,
        session: &SessionKey,
        threshold: f64,
    ) -> MemoryResult<Vec<(Message, f64)>> {
        self.store.search(query, session, threshold).await
    }

    /// Deletes the session from the store and invalidates its cached slice.
    ///
    /// # Errors
    ///
    /// Propagates store errors; the cache is left untouched in that case.
    pub async fn clear(&self, session: &SessionKey) -> MemoryResult<()> {
        let _guard = self.locks.acquire(session).await;
        self.store.clear(session).await?;
        self.cache.invalidate(session);
        Ok(())
    }

    /// Returns the accumulated cache and fallback metrics.
    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn tail(mut messages: Vec<Message>, n: usize) -> Vec<Message> {
    let skip = messages.len().saturating_sub(n);
    messages.split_off(skip)
}
