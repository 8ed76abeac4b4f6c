use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::future::join_all;
use recall_memory::{
    CacheConfig, CacheError, CacheResult, InMemoryMessageStore, MemoryError, MemoryOrchestrator,
    MemoryResult, Message, MessageStore, OrchestratorConfig, RecencyCache, SessionKey,
    TranscriptCache,
};

fn key(value: &str) -> SessionKey {
    SessionKey::new(value).unwrap()
}

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn message(session: &SessionKey, content: impl Into<String>, secs: u64) -> Message {
    Message::builder(session.clone(), content)
        .timestamp(at(secs))
        .build()
}

/// ~300 estimated tokens of distinct ideographs per message.
fn cjk_message(session: &SessionKey, i: u32) -> Message {
    let base = 0x4E00 + i * 17;
    let body: String = (0..390u32)
        .map(|j| char::from_u32(base + (j % 11)).unwrap())
        .collect();
    message(session, body, u64::from(i))
}

/// Store wrapper whose every operation fails while `down` is set.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryMessageStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> MemoryResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(MemoryError::store("store unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn append(&self, message: &Message) -> MemoryResult<()> {
        self.check()?;
        self.inner.append(message).await
    }

    async fn load_recent(&self, session: &SessionKey, limit: usize) -> MemoryResult<Vec<Message>> {
        self.check()?;
        self.inner.load_recent(session, limit).await
    }

    async fn search(
        &self,
        query: &str,
        session: &SessionKey,
        threshold: f64,
    ) -> MemoryResult<Vec<(Message, f64)>> {
        self.check()?;
        self.inner.search(query, session, threshold).await
    }

    async fn clear(&self, session: &SessionKey) -> MemoryResult<()> {
        self.check()?;
        self.inner.clear(session).await
    }
}

/// Cache wrapper whose `put` fails while `fail_puts` is set.
struct FaultyCache {
    inner: RecencyCache,
    fail_puts: AtomicBool,
}

impl FaultyCache {
    fn new() -> Self {
        Self {
            inner: RecencyCache::default(),
            fail_puts: AtomicBool::new(false),
        }
    }
}

impl TranscriptCache for FaultyCache {
    fn get(&self, key: &SessionKey) -> CacheResult<Option<Vec<Message>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &SessionKey, messages: Vec<Message>) -> CacheResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(CacheError::backend("injected put failure"));
        }
        self.inner.put(key, messages)
    }

    fn invalidate(&self, key: &SessionKey) {
        self.inner.invalidate(key);
    }

    fn is_valid(&self, key: &SessionKey) -> bool {
        self.inner.is_valid(key)
    }
}

/// Store wrapper that sleeps after the next append lands and before every
/// `load_recent`.
#[derive(Default)]
struct StallingStore {
    inner: InMemoryMessageStore,
    stall_next_append: AtomicBool,
    append_stall: Duration,
    load_stall: Duration,
}

impl StallingStore {
    fn with_append_stall(stall: Duration) -> Self {
        Self {
            stall_next_append: AtomicBool::new(true),
            append_stall: stall,
            ..Self::default()
        }
    }

    fn with_load_stall(stall: Duration) -> Self {
        Self {
            load_stall: stall,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MessageStore for StallingStore {
    async fn append(&self, message: &Message) -> MemoryResult<()> {
        self.inner.append(message).await?;
        if self.stall_next_append.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.append_stall).await;
        }
        Ok(())
    }

    async fn load_recent(&self, session: &SessionKey, limit: usize) -> MemoryResult<Vec<Message>> {
        tokio::time::sleep(self.load_stall).await;
        self.inner.load_recent(session, limit).await
    }

    async fn search(
        &self,
        query: &str,
        session: &SessionKey,
        threshold: f64,
    ) -> MemoryResult<Vec<(Message, f64)>> {
        self.inner.search(query, session, threshold).await
    }

    async fn clear(&self, session: &SessionKey) -> MemoryResult<()> {
        self.inner.clear(session).await
    }
}

fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(Message::content).collect()
}

fn build(store: Arc<dyn MessageStore>) -> MemoryOrchestrator {
    MemoryOrchestrator::builder(OrchestratorConfig::default())
        .with_store(store)
        .build()
        .unwrap()
}

#[tokio::test]
async fn append_then_read_returns_the_message() {
    let orchestrator = build(Arc::new(InMemoryMessageStore::new()));
    let session = key("tenant:rw");

    for i in 0..5 {
        let m = message(&session, format!("turn {i}"), i);
        orchestrator.append(m.clone()).await.unwrap();
        assert_eq!(orchestrator.load_recent(&session, 1).await.unwrap(), vec![m]);
    }

    let recent = orchestrator.load_recent(&session, 3).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(Message::content).collect();
    assert_eq!(contents, ["turn 2", "turn 3", "turn 4"]);
}

#[tokio::test]
async fn results_are_bounded_and_chronological() {
    let store = Arc::new(InMemoryMessageStore::new());
    let session = key("tenant:bounded");
    for i in 0..30 {
        store
            .append(&message(&session, format!("line {i} {}", "word ".repeat(i as usize)), i))
            .await
            .unwrap();
    }
    let orchestrator = build(store);

    for n in [1, 2, 5, 17, 40] {
        orchestrator.cache().invalidate(&session);
        for _ in 0..2 {
            let recent = orchestrator.load_recent(&session, n).await.unwrap();
            assert!(recent.len() <= n);
            assert!(recent.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
        }
    }
}

#[tokio::test]
async fn invalidation_costs_exactly_one_fallback() {
    let store = Arc::new(InMemoryMessageStore::new());
    let orchestrator = build(store);
    let session = key("tenant:inv");
    orchestrator
        .append(message(&session, "hello", 1))
        .await
        .unwrap();

    let before = orchestrator.get_metrics().fallback_count;
    orchestrator.cache().invalidate(&session);
    orchestrator.load_recent(&session, 4).await.unwrap();
    orchestrator.load_recent(&session, 4).await.unwrap();

    assert_eq!(orchestrator.get_metrics().fallback_count, before + 1);
}

#[tokio::test]
async fn cjk_transcript_is_compacted_on_fallback() {
    let store = Arc::new(InMemoryMessageStore::new());
    let session = key("s1");
    for i in 0..100 {
        store.append(&cjk_message(&session, i)).await.unwrap();
    }
    let orchestrator = build(store.clone());

    let recent = orchestrator.load_recent(&session, 10).await.unwrap();
    assert!(recent.len() <= 10);
    let newest = store.load_recent(&session, 1).await.unwrap();
    assert_eq!(recent.last(), newest.last());

    // 20 fetched at ~300 tokens each; 4000 tokens fit 13 of them.
    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.fallback_count, 1);
    assert!((metrics.compression_ratio - 13.0 / 20.0).abs() < 1e-9);

    orchestrator.cache().invalidate(&session);
    let wider = orchestrator.load_recent(&session, 50).await.unwrap();
    assert_eq!(wider.len(), 13);

    // Second fallback fetched 100 and kept 13: running mean of both ratios.
    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.fallback_count, 2);
    assert!((metrics.compression_ratio - (0.65 + 0.13) / 2.0).abs() < 1e-9);
    assert!(metrics.avg_fallback_time_ms >= 0.0);
}

#[tokio::test]
async fn failed_durable_write_leaves_cache_untouched() {
    let store = Arc::new(FlakyStore::default());
    let orchestrator = build(store.clone());
    let session = key("tenant:durable");

    let first = message(&session, "kept", 1);
    orchestrator.append(first.clone()).await.unwrap();

    store.set_down(true);
    let err = orchestrator
        .append(message(&session, "lost", 2))
        .await
        .expect_err("append must fail while the store is down");
    assert!(matches!(err, MemoryError::DurableWrite { ref session, .. } if session.as_str() == "tenant:durable"));

    assert_eq!(
        orchestrator.cache().get(&session).unwrap(),
        Some(vec![first])
    );
}

#[tokio::test(start_paused = true)]
async fn outage_is_masked_until_the_cache_expires() {
    let store = Arc::new(FlakyStore::default());
    let orchestrator = build(store.clone());
    let session = key("tenant:outage");
    for i in 0..3 {
        orchestrator
            .append(message(&session, format!("m{i}"), i))
            .await
            .unwrap();
    }

    store.set_down(true);
    assert_eq!(orchestrator.load_recent(&session, 3).await.unwrap().len(), 3);

    tokio::time::advance(Duration::from_secs(901)).await;
    let err = orchestrator
        .load_recent(&session, 3)
        .await
        .expect_err("fallback should surface the outage");
    assert!(matches!(err, MemoryError::Store { .. }));

    store.set_down(false);
    assert_eq!(orchestrator.load_recent(&session, 3).await.unwrap().len(), 3);
}

#[tokio::test]
async fn cache_put_failure_is_swallowed_and_invalidates() {
    let store = Arc::new(InMemoryMessageStore::new());
    let cache = Arc::new(FaultyCache::new());
    let orchestrator = MemoryOrchestrator::builder(OrchestratorConfig::default())
        .with_store(store.clone())
        .with_cache(cache.clone())
        .build()
        .unwrap();
    let session = key("tenant:faulty");

    orchestrator
        .append(message(&session, "before", 1))
        .await
        .unwrap();
    assert!(cache.is_valid(&session));

    cache.fail_puts.store(true, Ordering::SeqCst);
    orchestrator
        .append(message(&session, "during", 2))
        .await
        .unwrap();
    assert!(!cache.is_valid(&session));
    assert_eq!(store.len(&session).await, 2);

    // Fallback still answers even though repopulating the cache fails.
    let recent = orchestrator.load_recent(&session, 5).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(Message::content).collect();
    assert_eq!(contents, ["before", "during"]);
    assert!(!cache.is_valid(&session));
}

#[tokio::test]
async fn search_bypasses_the_cache() {
    let store = Arc::new(InMemoryMessageStore::new());
    let orchestrator = build(store);
    let session = key("tenant:search");
    for (i, content) in ["invoice overdue", "weather is nice", "send the invoice"]
        .into_iter()
        .enumerate()
    {
        orchestrator
            .append(message(&session, content, i as u64))
            .await
            .unwrap();
    }

    let results = orchestrator.search("invoice", &session, 0.5).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, score)| *score >= 0.5));

    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.cache_hits + metrics.cache_misses, 0);
}

#[tokio::test]
async fn clear_removes_history_and_invalidates() {
    let store = Arc::new(InMemoryMessageStore::new());
    let orchestrator = build(store.clone());
    let session = key("tenant:clear");
    orchestrator
        .append(message(&session, "forget me", 1))
        .await
        .unwrap();

    orchestrator.clear(&session).await.unwrap();
    orchestrator.clear(&session).await.unwrap();

    assert!(!orchestrator.cache().is_valid(&session));
    assert!(orchestrator.load_recent(&session, 5).await.unwrap().is_empty());
    assert_eq!(store.len(&session).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_do_not_lose_updates() {
    let store = Arc::new(InMemoryMessageStore::new());
    let config = OrchestratorConfig::default().with_cache(
        CacheConfig::new(NonZeroUsize::new(16).unwrap())
            .with_max_messages(NonZeroUsize::new(100).unwrap()),
    );
    let orchestrator = MemoryOrchestrator::builder(config)
        .with_store(store.clone())
        .build()
        .unwrap();
    let session = key("tenant:concurrent");
    orchestrator
        .append(message(&session, "seed", 0))
        .await
        .unwrap();

    let writes = (1..=40u64).map(|i| {
        let orchestrator = orchestrator.clone();
        let m = message(&session, format!("parallel {i}"), i);
        tokio::spawn(async move { orchestrator.append(m).await })
    });
    for result in join_all(writes).await {
        result.unwrap().unwrap();
    }

    let cached = orchestrator.load_recent(&session, 100).await.unwrap();
    let ids: HashSet<_> = cached.iter().map(Message::id).collect();
    assert_eq!(cached.len(), 41);
    assert_eq!(ids.len(), 41);
    assert_eq!(orchestrator.get_metrics().cache_hits, 1);

    let stored = store.load_recent(&session, 100).await.unwrap();
    assert_eq!(contents(&cached), contents(&stored));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_fallback_and_append_do_not_duplicate() {
    let store = Arc::new(InMemoryMessageStore::new());
    let session = key("tenant:race");
    for i in 0..10 {
        store
            .append(&message(&session, format!("old {i}"), i))
            .await
            .unwrap();
    }
    let orchestrator = build(store);

    let reader = {
        let orchestrator = orchestrator.clone();
        let session = session.clone();
        tokio::spawn(async move { orchestrator.load_recent(&session, 10).await })
    };
    let writer = {
        let orchestrator = orchestrator.clone();
        let m = message(&session, "fresh", 100);
        tokio::spawn(async move { orchestrator.append(m).await })
    };
    reader.await.unwrap().unwrap();
    writer.await.unwrap().unwrap();

    let recent = orchestrator.load_recent(&session, 50).await.unwrap();
    let fresh = recent.iter().filter(|m| m.content() == "fresh").count();
    assert_eq!(fresh, 1);
    assert_eq!(recent.last().map(Message::content), Some("fresh"));
}

#[tokio::test(start_paused = true)]
async fn slow_durable_write_keeps_cache_in_store_order() {
    let store = Arc::new(StallingStore::with_append_stall(Duration::from_millis(100)));
    let orchestrator = build(store.clone());
    let session = key("tenant:ordering");

    let slow = {
        let orchestrator = orchestrator.clone();
        let m = message(&session, "slow", 1);
        tokio::spawn(async move { orchestrator.append(m).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = {
        let orchestrator = orchestrator.clone();
        let m = message(&session, "fast", 2);
        tokio::spawn(async move { orchestrator.append(m).await })
    };
    slow.await.unwrap().unwrap();
    fast.await.unwrap().unwrap();

    let stored = store.inner.load_recent(&session, 10).await.unwrap();
    let recent = orchestrator.load_recent(&session, 10).await.unwrap();
    assert_eq!(contents(&stored), ["slow", "fast"]);
    assert_eq!(contents(&recent), ["slow", "fast"]);
    assert!(recent.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    assert_eq!(orchestrator.get_metrics().cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn simultaneous_misses_share_one_fallback() {
    let store = Arc::new(StallingStore::with_load_stall(Duration::from_millis(50)));
    let session = key("tenant:stampede");
    for i in 0..5 {
        store
            .inner
            .append(&message(&session, format!("turn {i}"), i))
            .await
            .unwrap();
    }
    let orchestrator = build(store);

    let readers = (0..8).map(|_| {
        let orchestrator = orchestrator.clone();
        let session = session.clone();
        tokio::spawn(async move { orchestrator.load_recent(&session, 5).await })
    });
    let results: Vec<_> = join_all(readers)
        .await
        .into_iter()
        .map(|result| result.unwrap().unwrap())
        .collect();

    assert!(results.iter().all(|recent| recent == &results[0]));
    assert_eq!(results[0].len(), 5);
    let metrics = orchestrator.get_metrics();
    assert_eq!(metrics.fallback_count, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.cache_hits, 7);
}
