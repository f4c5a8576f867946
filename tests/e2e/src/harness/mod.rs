//! Seed-scenario harness: bundles a real `SqliteStore`, an in-memory
//! vector index, and a deterministic keyword embedder behind the same
//! `HybridSearchService`/`OutcomePipeline`/`KnownSolutions` types a host
//! application wires up, minus the network calls.

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use memoria_core::config::Config;
use memoria_core::embedder::{l2_normalize, Embedder, EmbedderError};
use memoria_core::memory::{MemoryStore, Source, StoreParams, Tier};
use memoria_core::known_solutions::KnownSolutions;
use memoria_core::lexical::LexicalAdapter;
use memoria_core::outcome::OutcomePipeline;
use memoria_core::search::HybridSearchService;
use memoria_core::store::SqliteStore;
use memoria_core::vector::{InMemoryVectorIndex, VectorIndexAdapter, VectorPayload, VectorPoint};
use memoria_core::MemoryItem;

/// Deterministic embedding: one dimension per vocabulary word, 1.0 if the
/// word appears in the text, l2-normalised. Lets scenario tests control
/// dense similarity without a real model.
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbedderError> {
        let lower = text.to_lowercase();
        let mut raw: Vec<f32> = self
            .vocabulary
            .iter()
            .map(|w| if lower.contains(w.as_str()) { 1.0 } else { 0.0 })
            .collect();
        l2_normalize(&mut raw);
        Ok(Some(raw))
    }

    fn model_id(&self) -> &str {
        "keyword-fake"
    }
}

/// Wraps a `MemoryStore` so `text_search` can be made to fail on demand,
/// for exercising the lexical adapter's circuit breaker end to end.
pub struct FlakyStore<S: MemoryStore> {
    inner: Arc<S>,
    fail_text_search: Mutex<bool>,
}

impl<S: MemoryStore> FlakyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self { inner, fail_text_search: Mutex::new(false) }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_text_search.lock().unwrap() = failing;
    }
}

#[async_trait]
impl<S: MemoryStore> MemoryStore for FlakyStore<S> {
    async fn store(&self, params: StoreParams) -> memoria_core::error::StorageResult<MemoryItem> {
        self.inner.store(params).await
    }
    async fn update(
        &self,
        memory_id: &str,
        user_id: &str,
        params: memoria_core::memory::UpdateParams,
    ) -> memoria_core::error::StorageResult<MemoryItem> {
        self.inner.update(memory_id, user_id, params).await
    }
    async fn get_by_id(&self, memory_id: &str, user_id: &str) -> memoria_core::error::StorageResult<Option<MemoryItem>> {
        self.inner.get_by_id(memory_id, user_id).await
    }
    async fn delete(&self, memory_id: &str, user_id: &str) -> memoria_core::error::StorageResult<bool> {
        self.inner.delete(memory_id, user_id).await
    }
    async fn archive(&self, memory_id: &str, user_id: &str, reason: Option<&str>) -> memoria_core::error::StorageResult<bool> {
        self.inner.archive(memory_id, user_id, reason).await
    }
    async fn query(
        &self,
        filters: memoria_core::memory::QueryFilters,
    ) -> memoria_core::error::StorageResult<Vec<MemoryItem>> {
        self.inner.query(filters).await
    }
    async fn text_search(
        &self,
        user_id: &str,
        query: &str,
        opts: memoria_core::memory::TextSearchOptions,
    ) -> memoria_core::error::StorageResult<Vec<memoria_core::memory::LexicalHit>> {
        if *self.fail_text_search.lock().unwrap() {
            return Err(memoria_core::error::StorageError::Init("lexical backend unavailable".to_string()));
        }
        self.inner.text_search(user_id, query, opts).await
    }
    async fn get_always_inject(&self, user_id: &str) -> memoria_core::error::StorageResult<Vec<MemoryItem>> {
        self.inner.get_always_inject(user_id).await
    }
    async fn count_by_tier(&self, user_id: &str) -> memoria_core::error::StorageResult<std::collections::HashMap<Tier, u64>> {
        self.inner.count_by_tier(user_id).await
    }
    async fn count_active(&self, user_id: &str) -> memoria_core::error::StorageResult<u64> {
        self.inner.count_active(user_id).await
    }
    async fn record_outcome(
        &self,
        memory_id: &str,
        user_id: &str,
        outcome: memoria_core::memory::OutcomeKind,
        score_delta: f64,
    ) -> memoria_core::error::StorageResult<MemoryItem> {
        self.inner.record_outcome(memory_id, user_id, outcome, score_delta).await
    }
    async fn record_action_outcome(
        &self,
        user_id: &str,
        context_type: &str,
        action: &str,
        tier: Option<Tier>,
        outcome: memoria_core::memory::OutcomeKind,
    ) -> memoria_core::error::StorageResult<()> {
        self.inner.record_action_outcome(user_id, context_type, action, tier, outcome).await
    }
    async fn update_embedding_info(
        &self,
        memory_id: &str,
        user_id: &str,
        model_id: &str,
        dimensions: usize,
        vector_hash: &str,
    ) -> memoria_core::error::StorageResult<()> {
        self.inner.update_embedding_info(memory_id, user_id, model_id, dimensions, vector_hash).await
    }
    async fn get_memories_needing_reindex(&self, user_id: &str, limit: usize) -> memoria_core::error::StorageResult<Vec<MemoryItem>> {
        self.inner.get_memories_needing_reindex(user_id, limit).await
    }
    async fn get_version_history(&self, memory_id: &str, user_id: &str) -> memoria_core::error::StorageResult<Vec<memoria_core::memory::MemoryVersion>> {
        self.inner.get_version_history(memory_id, user_id).await
    }
}

pub struct TestHarness {
    pub store: Arc<SqliteStore>,
    pub vector_index: Arc<InMemoryVectorIndex>,
    pub embedder: Arc<KeywordEmbedder>,
    pub search: HybridSearchService<SqliteStore, InMemoryVectorIndex, KeywordEmbedder>,
    pub outcomes: OutcomePipeline<SqliteStore>,
    pub known_solutions: KnownSolutions<SqliteStore>,
}

static TRACING_INIT: Once = Once::new();

/// Installs a stderr subscriber once per test binary, so `cargo test -- --nocapture`
/// shows the spans/events the library emits during a run.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

impl TestHarness {
    pub fn new(vocabulary: &[&str]) -> Self {
        init_tracing();
        let store = Arc::new(SqliteStore::open(None).expect("open in-memory store"));
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let embedder = Arc::new(KeywordEmbedder::new(vocabulary));
        let config = Config::default();
        let lexical = LexicalAdapter::new(
            store.clone(),
            memoria_core::circuit::CircuitBreaker::new("bm25", config.circuit_breakers.bm25),
        );
        let search = HybridSearchService::new(
            store.clone(),
            vector_index.clone(),
            embedder.clone(),
            lexical,
            None,
            config.clone(),
        );
        let outcomes = OutcomePipeline::new(store.clone(), config.outcome_deltas);
        let known_solutions = KnownSolutions::new(store.clone(), store.clone());

        Self { store, vector_index, embedder, search, outcomes, known_solutions }
    }

    /// Stores a memory item and indexes its embedding, mirroring what an
    /// ingestion path does for both adapters in lockstep.
    pub async fn seed(&self, user_id: &str, text: &str, tier: Tier, source: Source) -> MemoryItem {
        let item = self
            .store
            .store(StoreParams::new(user_id, text, tier, source))
            .await
            .expect("seed store");
        if let Ok(Some(vector)) = self.embedder.embed(text).await {
            self.vector_index
                .upsert(vec![VectorPoint {
                    memory_id: item.memory_id.clone(),
                    user_id: user_id.to_string(),
                    vector,
                    payload: VectorPayload {
                        tier: item.tier,
                        status: item.status,
                        content: item.text.clone(),
                        uses: item.stats.uses,
                        composite_score: 0.5,
                    },
                }])
                .await
                .expect("seed vector upsert");
        }
        item
    }
}
