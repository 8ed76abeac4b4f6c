//! Bounded, TTL-expiring recency cache of per-session transcript slices.
//!
//! Entries live in a slab-backed doubly linked list ordered by last access,
//! indexed by a hash map, so lookups, promotion, and LRU eviction are O(1).
//! A single short-lived mutex guards the structure; it is never held across
//! an `.await`.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use recall_primitives::SessionKey;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use crate::message::Message;

/// Failures surfaced by [`TranscriptCache`] implementations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A panic while the cache lock was held left it poisoned.
    #[error("recency cache lock poisoned")]
    Poisoned,
    /// An external cache backend failed.
    #[error("cache backend error: {reason}")]
    Backend {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl CacheError {
    /// Helper to construct backend errors from string-like values.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Per-session transcript cache consulted by the orchestrator.
///
/// Operations are synchronous: implementations must not block on I/O.
pub trait TranscriptCache: Send + Sync {
    /// Returns a copy of the cached messages, or `None` when absent, expired,
    /// or invalidated. A hit refreshes the entry's last access.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend cannot be read.
    fn get(&self, key: &SessionKey) -> CacheResult<Option<Vec<Message>>>;

    /// Stores `messages` for `key`, marking the entry valid.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend cannot be written.
    fn put(&self, key: &SessionKey, messages: Vec<Message>) -> CacheResult<()>;

    /// Marks the entry invalid without removing it. Idempotent.
    fn invalidate(&self, key: &SessionKey);

    /// Returns `true` when `key` holds a live, valid entry.
    fn is_valid(&self, key: &SessionKey) -> bool;
}

/// Configuration for the recency cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    capacity: NonZeroUsize,
    max_messages: NonZeroUsize,
    ttl: Duration,
}

impl CacheConfig {
    /// Creates a configuration holding up to `capacity` sessions.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Sets the per-session message bound.
    #[must_use]
    pub fn with_max_messages(mut self, max_messages: NonZeroUsize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Sets the sliding time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the configured session capacity.
    #[must_use]
    pub const fn capacity(self) -> NonZeroUsize {
        self.capacity
    }

    /// Returns the per-session message bound.
    #[must_use]
    pub const fn max_messages(self) -> NonZeroUsize {
        self.max_messages
    }

    /// Returns the sliding time-to-live.
    #[must_use]
    pub const fn ttl(self) -> Duration {
        self.ttl
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(1024).expect("non-zero"),
            max_messages: NonZeroUsize::new(50).expect("non-zero"),
            ttl: Duration::from_secs(900),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    messages: Vec<Message>,
    last_access: Instant,
    valid: bool,
}

#[derive(Debug)]
struct Node {
    key: SessionKey,
    entry: CacheEntry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Hash map over a slab of list nodes; `head` is most recently used.
#[derive(Debug, Default)]
struct LruList {
    index: HashMap<SessionKey, usize>,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    evictions: u64,
    expirations: u64,
}

impl LruList {
    fn node(&self, idx: usize) -> &Node {
        self.slots[idx].as_ref().expect("linked slot is occupied")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.slots[idx].as_mut().expect("linked slot is occupied")
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => self.node_mut(head).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn insert(&mut self, key: SessionKey, entry: CacheEntry) {
        let node = Node {
            key: key.clone(),
            entry,
            prev: None,
            next: None,
        };
        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        };
        self.index.insert(key, idx);
        self.push_front(idx);
    }

    fn remove(&mut self, idx: usize) -> Node {
        self.unlink(idx);
        let node = self.slots[idx].take().expect("linked slot is occupied");
        self.index.remove(&node.key);
        self.free.push(idx);
        node
    }

    fn clear(&mut self) {
        let evictions = self.evictions;
        let expirations = self.expirations;
        *self = Self {
            evictions,
            expirations,
            ..Self::default()
        };
    }

    /// Looks up `key`, dropping the entry if its TTL has lapsed.
    fn live_index(&mut self, key: &SessionKey, now: Instant, ttl: Duration) -> Option<usize> {
        let idx = *self.index.get(key)?;
        if now.saturating_duration_since(self.node(idx).entry.last_access) > ttl {
            self.remove(idx);
            self.expirations += 1;
            return None;
        }
        Some(idx)
    }
}

/// Snapshot describing utilisation of the recency cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Sessions currently occupying a slot, valid or not.
    pub entries: usize,
    /// Maximum number of sessions.
    pub capacity: usize,
    /// Sessions removed to respect the capacity.
    pub evictions: u64,
    /// Sessions dropped because their TTL lapsed.
    pub expirations: u64,
}

/// In-process LRU + TTL implementation of [`TranscriptCache`].
#[derive(Debug)]
pub struct RecencyCache {
    config: CacheConfig,
    inner: Mutex<LruList>,
}

impl RecencyCache {
    /// Creates an empty cache using the supplied configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LruList::default()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> CacheConfig {
        self.config
    }

    /// Number of occupied slots, including invalidated entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_or_reset().index.len()
    }

    /// Returns `true` when no session occupies a slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns statistics about the cache utilisation.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let guard = self.lock_or_reset();
        CacheStats {
            entries: guard.index.len(),
            capacity: self.config.capacity().get(),
            evictions: guard.evictions,
            expirations: guard.expirations,
        }
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, LruList>> {
        self.inner.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Recovers a poisoned lock by discarding every entry, since a panic may
    /// have left the list half-linked.
    fn lock_or_reset(&self) -> MutexGuard<'_, LruList> {
        self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("recency cache lock poisoned; dropping all entries");
            let mut guard = poisoned.into_inner();
            guard.clear();
            self.inner.clear_poison();
            guard
        })
    }
}

impl Default for RecencyCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl TranscriptCache for RecencyCache {
    fn get(&self, key: &SessionKey) -> CacheResult<Option<Vec<Message>>> {
        let mut guard = self.lock()?;
        let now = Instant::now();
        let Some(idx) = guard.live_index(key, now, self.config.ttl()) else {
            return Ok(None);
        };
        if !guard.node(idx).entry.valid {
            return Ok(None);
        }

        guard.promote(idx);
        let entry = &mut guard.node_mut(idx).entry;
        entry.last_access = now;
        Ok(Some(entry.messages.clone()))
    }

    fn put(&self, key: &SessionKey, mut messages: Vec<Message>) -> CacheResult<()> {
        let max = self.config.max_messages().get();
        if messages.len() > max {
            messages.drain(..messages.len() - max);
        }

        let mut guard = self.lock()?;
        let entry = CacheEntry {
            messages,
            last_access: Instant::now(),
            valid: true,
        };

        if let Some(&idx) = guard.index.get(key) {
            guard.node_mut(idx).entry = entry;
            guard.promote(idx);
            return Ok(());
        }

        guard.insert(key.clone(), entry);
        while guard.index.len() > self.config.capacity().get() {
            let Some(lru) = guard.tail else { break };
            guard.remove(lru);
            guard.evictions += 1;
        }
        Ok(())
    }

    fn invalidate(&self, key: &SessionKey) {
        let mut guard = self.lock_or_reset();
        if let Some(&idx) = guard.index.get(key) {
            guard.node_mut(idx).entry.valid = false;
        }
    }

    fn is_valid(&self, key: &SessionKey) -> bool {
        let mut guard = self.lock_or_reset();
        guard
            .live_index(key, Instant::now(), self.config.ttl())
            .is_some_and(|idx| guard.node(idx).entry.valid)
    }
}
