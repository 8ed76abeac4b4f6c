//! Durable message store contract and an in-process implementation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use recall_compaction::terms;
use recall_primitives::SessionKey;
use tokio::sync::RwLock;

use crate::MemoryResult;
use crate::message::Message;

/// Append-only durable log of session transcripts.
///
/// Implementations own the messages they hold; callers receive copies.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Durably appends a message to its session.
    ///
    /// A failure here is reported to the caller of
    /// [`MemoryOrchestrator::append`](crate::MemoryOrchestrator::append) as
    /// [`MemoryError::DurableWrite`](crate::MemoryError::DurableWrite).
    async fn append(&self, message: &Message) -> MemoryResult<()>;

    /// Returns up to `limit` of the most recent messages, oldest to newest.
    async fn load_recent(&self, session: &SessionKey, limit: usize) -> MemoryResult<Vec<Message>>;

    /// Full-corpus search within a session.
    ///
    /// Returns matches scoring at least `threshold`, best first.
    async fn search(
        &self,
        query: &str,
        session: &SessionKey,
        threshold: f64,
    ) -> MemoryResult<Vec<(Message, f64)>>;

    /// Removes every message of the session. Clearing an unknown session is a no-op.
    async fn clear(&self, session: &SessionKey) -> MemoryResult<()>;
}

/// Non-durable [`MessageStore`] keeping transcripts in a map.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    sessions: RwLock<HashMap<SessionKey, Vec<Message>>>,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages held for `session`.
    pub async fn len(&self, session: &SessionKey) -> usize {
        self.sessions.read().await.get(session).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: &Message) -> MemoryResult<()> {
        let mut guard = self.sessions.write().await;
        guard
            .entry(message.session_key().clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_recent(&self, session: &SessionKey, limit: usize) -> MemoryResult<Vec<Message>> {
        let guard = self.sessions.read().await;
        let Some(messages) = guard.get(session) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(limit);
        Ok(messages[skip..].to_vec())
    }

    async fn search(
        &self,
        query: &str,
        session: &SessionKey,
        threshold: f64,
    ) -> MemoryResult<Vec<(Message, f64)>> {
        let guard = self.sessions.read().await;
        let messages = guard.get(session).map_or(&[][..], Vec::as_slice);
        Ok(rank_matches(query, messages.iter().cloned(), threshold))
    }

    async fn clear(&self, session: &SessionKey) -> MemoryResult<()> {
        self.sessions.write().await.remove(session);
        Ok(())
    }
}

/// Scores each message by the share of distinct query terms it contains
/// (case-insensitive) and keeps non-zero scores at or above `threshold`,
/// best first with ties in transcript order.
pub(crate) fn rank_matches<I>(query: &str, messages: I, threshold: f64) -> Vec<(Message, f64)>
where
    I: IntoIterator<Item = Message>,
{
    let query = query.to_lowercase();
    let wanted: HashSet<&str> = terms(&query).into_iter().collect();
    if wanted.is_empty() {
        return Vec::new();
    }

    #[allow(clippy::cast_precision_loss)]
    let wanted_len = wanted.len() as f64;

    let mut matches: Vec<(Message, f64)> = messages
        .into_iter()
        .filter_map(|message| {
            let content = message.content().to_lowercase();
            let present: HashSet<&str> = terms(&content).into_iter().collect();
            #[allow(clippy::cast_precision_loss)]
            let score = wanted.intersection(&present).count() as f64 / wanted_len;
            (score > 0.0 && score >= threshold).then_some((message, score))
        })
        .collect();

    matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    matches
}
