//! Hybrid Search Service (spec.md §4.6): turns a query into ranked, cited
//! results by fusing dense and lexical retrieval with Reciprocal Rank
//! Fusion, optionally reranking the fused top-K with a cross-encoder, and
//! blending in each candidate's Wilson score before the final cut.
//!
//! The search path is fail-open end to end: a failing stage is recorded in
//! [`SearchDebug::errors`] and degrades the result set rather than failing
//! the request.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use lru::LruCache;

use crate::circuit::{guarded, CircuitBreaker};
use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::SearchStageError;
use crate::kg::extract_entities;
use crate::lexical::{LexicalAdapter, LexicalSearchParams};
use crate::memory::{MemoryItem, MemoryStore, Source, Tier};
use crate::reranker::RerankerClient;
use crate::vector::{VectorIndexAdapter, VectorSearchParams};

const PREVIEW_CHARS: usize = 200;

/// Prefixes identifying a raw conversation snippet, which should never
/// surface from the `working` tier as a standalone search hit.
const CONVERSATION_SNIPPET_PREFIXES: &[&str] =
    &["User:", "Assistant:", "<think>", "Detailed Results:", "[Tool Result]"];

fn is_conversation_snippet(text: &str) -> bool {
    let trimmed = text.trim_start();
    CONVERSATION_SNIPPET_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Truncates `text` to [`PREVIEW_CHARS`] characters, appending an ellipsis
/// when it was cut.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub user_id: String,
    pub query: String,
    pub tiers: Option<Vec<Tier>>,
    pub limit: usize,
    pub enable_rerank: bool,
    pub min_score: Option<f32>,
    /// Entities to pre-filter the vector search by. Extracted from `query`
    /// via [`extract_entities`] when absent.
    pub query_entities: Option<Vec<String>>,
    pub enable_entity_pre_filter: bool,
}

impl SearchParams {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
            tiers: None,
            limit: 10,
            enable_rerank: false,
            min_score: None,
            query_entities: None,
            enable_entity_pre_filter: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoreSummary {
    pub final_score: f32,
    pub dense_score: Option<f32>,
    pub text_score: Option<f32>,
    pub rrf_score: f32,
    pub cross_encoder_score: Option<f32>,
    pub wilson_score: Option<f64>,
    pub uses: u32,
    pub dense_rank: Option<usize>,
    pub text_rank: Option<usize>,
}

/// A pointer back to a result's provenance, populated for document-sourced
/// memories so a caller can surface "from: <title>, <url>".
#[derive(Debug, Clone)]
pub struct Citation {
    pub label: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub position: usize,
    pub tier: Tier,
    pub memory_id: String,
    pub content: String,
    pub preview: String,
    pub score: ScoreSummary,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchDebug {
    pub stage_timings_ms: HashMap<String, u64>,
    pub fallbacks_used: Vec<String>,
    pub errors: Vec<SearchStageError>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub debug: SearchDebug,
}

/// Per-candidate accumulator used while fusing the two retrieval lists.
/// Tier is resolved once the backing [`MemoryItem`] is fetched, since a
/// lexical hit alone carries no tier.
struct Candidate {
    dense_rank: Option<usize>,
    dense_score: Option<f32>,
    text_rank: Option<usize>,
    text_score: Option<f32>,
}

/// Query embeddings are cached by raw query text so a repeated search (the
/// common case for a user refining filters on the same question) doesn't
/// re-embed it.
const QUERY_CACHE_CAPACITY: usize = 100;

pub struct HybridSearchService<S: MemoryStore, V: VectorIndexAdapter, E: Embedder> {
    store: Arc<S>,
    vector_index: Arc<V>,
    embedder: Arc<E>,
    lexical: LexicalAdapter<S>,
    reranker: Option<RerankerClient>,
    config: Config,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    /// Guards dense retrieval the same way the lexical adapter guards its
    /// own store calls; trips independently of the lexical breaker.
    vector_breaker: CircuitBreaker,
}

impl<S: MemoryStore + 'static, V: VectorIndexAdapter + 'static, E: Embedder> HybridSearchService<S, V, E> {
    pub fn new(
        store: Arc<S>,
        vector_index: Arc<V>,
        embedder: Arc<E>,
        lexical: LexicalAdapter<S>,
        reranker: Option<RerankerClient>,
        config: Config,
    ) -> Self {
        let vector_breaker = CircuitBreaker::new("qdrant", config.circuit_breakers.qdrant);
        Self {
            store,
            vector_index,
            embedder,
            lexical,
            reranker,
            config,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            vector_breaker,
        }
    }

    fn tier_boost(&self, tier: Tier) -> f32 {
        let b = &self.config.tier_boosts;
        match tier {
            Tier::Books => b.documents,
            Tier::MemoryBank => b.memory_bank,
            Tier::Patterns => b.patterns,
            Tier::History => b.history,
            Tier::Working => b.working,
            Tier::DatagovSchema => b.datagov_schema,
            Tier::DatagovExpansion => b.datagov_expansion,
        }
    }

    /// Runs the full pipeline under the single end-to-end deadline (spec
    /// default 15s); a stage still in flight when the deadline elapses is
    /// abandoned and the caller gets whatever confidence/empty result the
    /// fail-open contract produces, rather than hanging indefinitely.
    pub async fn search(&self, params: SearchParams) -> SearchResponse {
        let deadline = self.config.timeouts.end_to_end_search();
        match tokio::time::timeout(deadline, self.search_inner(&params)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    user_id = %params.user_id,
                    query = %params.query,
                    deadline_ms = deadline.as_millis() as u64,
                    "search exceeded the end-to-end deadline, returning partial results"
                );
                let mut debug = SearchDebug::default();
                debug.fallbacks_used.push("end_to_end_timeout".to_string());
                debug.errors.push(SearchStageError::Timeout { stage: "end_to_end".to_string() });
                SearchResponse { results: Vec::new(), debug }
            }
        }
    }

    async fn search_inner(&self, params: &SearchParams) -> SearchResponse {
        let mut debug = SearchDebug::default();
        let limit = params.limit.min(self.config.caps.search_limit_max).max(1);
        let candidate_limit = limit * self.config.caps.candidate_fetch_multiplier_per_tier;

        // Step 1: embed the query, consulting the query cache first so a
        // repeated query never re-embeds. A `None`/error result degrades to
        // a lexical-only search rather than failing the request.
        let t0 = Instant::now();
        let cached_vector = self
            .query_cache
            .lock()
            .expect("query cache lock poisoned")
            .get(&params.query)
            .cloned();
        let query_vector = match cached_vector {
            Some(v) => Some(v),
            None => match self.embedder.embed(&params.query).await {
                Ok(Some(v)) => {
                    self.query_cache
                        .lock()
                        .expect("query cache lock poisoned")
                        .put(params.query.clone(), v.clone());
                    Some(v)
                }
                Ok(None) => None,
                Err(e) => {
                    debug.errors.push(SearchStageError::Transient {
                        stage: "embed".to_string(),
                        message: e.to_string(),
                    });
                    None
                }
            },
        };
        debug.stage_timings_ms.insert("embed".to_string(), t0.elapsed().as_millis() as u64);

        // Step 2: entity pre-filter. An empty match set falls back to an
        // unfiltered vector search rather than returning nothing.
        let t0 = Instant::now();
        let mut filter_ids: Option<Vec<String>> = None;
        if params.enable_entity_pre_filter {
            let entities = params
                .query_entities
                .clone()
                .unwrap_or_else(|| extract_entities(&params.query));
            if !entities.is_empty() {
                match self
                    .vector_index
                    .filter_by_entities(&params.user_id, &entities, candidate_limit * 4)
                    .await
                {
                    Ok(ids) if !ids.is_empty() => filter_ids = Some(ids),
                    Ok(_) => debug.fallbacks_used.push("entity_pre_filter_empty".to_string()),
                    Err(e) => debug.errors.push(SearchStageError::Transient {
                        stage: "entity_pre_filter".to_string(),
                        message: e.to_string(),
                    }),
                }
            }
        }
        debug
            .stage_timings_ms
            .insert("entity_pre_filter".to_string(), t0.elapsed().as_millis() as u64);

        // Step 3: parallel retrieval, each capped at candidate_limit. Dense
        // retrieval is guarded by its own circuit breaker, independent of
        // the lexical adapter's.
        let t0 = Instant::now();
        let vector_search = async {
            match &query_vector {
                Some(v) => {
                    let outcome = guarded(&self.vector_breaker, || {
                        self.vector_index.search(
                            &params.user_id,
                            v,
                            VectorSearchParams {
                                tiers: params.tiers.clone(),
                                status: None,
                                filter_ids: filter_ids.clone(),
                                limit: candidate_limit,
                            },
                        )
                    })
                    .await;
                    match outcome {
                        Some(Ok(hits)) => (hits, None),
                        Some(Err(e)) => (Vec::new(), Some(e.to_string())),
                        None => {
                            tracing::debug!(user_id = %params.user_id, "vector adapter: circuit open, skipping");
                            (Vec::new(), None)
                        }
                    }
                }
                None => (Vec::new(), None),
            }
        };
        let lexical_search = self.lexical.search(LexicalSearchParams {
            user_id: params.user_id.clone(),
            query: params.query.clone(),
            tiers: params.tiers.clone(),
            limit: candidate_limit,
            timeout_ms: self.config.timeouts.store_text_query_ms,
        });
        let ((vector_hits, vector_err), lexical_hits) = tokio::join!(vector_search, lexical_search);
        if let Some(message) = vector_err {
            debug.errors.push(SearchStageError::Transient { stage: "vector_search".to_string(), message });
        }
        debug
            .stage_timings_ms
            .insert("retrieval".to_string(), t0.elapsed().as_millis() as u64);

        let dense_contributed = !vector_hits.is_empty();
        let text_contributed = !lexical_hits.is_empty();

        // Degraded-mode labels the UI/confidence contract keys off: a dense
        // miss with lexical hits is a lexical-only result (covers both an
        // embed failure and an open vector breaker); the reverse is
        // vector-only (covers an open lexical breaker).
        if !dense_contributed && text_contributed {
            debug.fallbacks_used.push("lexical_only".to_string());
        } else if dense_contributed && !text_contributed {
            debug.fallbacks_used.push("vector_only".to_string());
        }

        // Step 4: RRF fusion. Tier boost is resolved per candidate after
        // fetching its memory item, since a lexical hit alone doesn't carry
        // a tier; the conversation-snippet filter runs in the same pass.
        let t0 = Instant::now();
        let mut by_id: HashMap<String, Candidate> = HashMap::new();
        for hit in &vector_hits {
            let rank = hit.position + 1;
            let c = by_id.entry(hit.memory_id.clone()).or_insert_with(|| Candidate {
                dense_rank: None,
                dense_score: None,
                text_rank: None,
                text_score: None,
            });
            c.dense_rank = Some(rank);
            c.dense_score = Some(hit.score);
        }
        for hit in &lexical_hits {
            let c = by_id.entry(hit.memory_id.clone()).or_insert_with(|| Candidate {
                dense_rank: None,
                dense_score: None,
                text_rank: None,
                text_score: None,
            });
            c.text_rank = Some(hit.rank);
            c.text_score = Some(hit.text_score);
        }

        let dense_weight = self.config.weights.embedding_blend.dense_weight;
        let text_weight = self.config.weights.embedding_blend.text_weight;

        let mut fused: Vec<(MemoryItem, Candidate, f32)> = Vec::with_capacity(by_id.len());
        for (memory_id, c) in by_id {
            let item = match self.store.get_by_id(&memory_id, &params.user_id).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    debug.errors.push(SearchStageError::Transient {
                        stage: "fusion_fetch".to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if item.tier == Tier::Working && is_conversation_snippet(&item.text) {
                continue;
            }

            let boost = self.tier_boost(item.tier);
            let mut rrf = 0.0_f32;
            if let Some(r) = c.dense_rank {
                rrf += boost * dense_weight * (1.0 / (r as f32 + 60.0));
            }
            if let Some(r) = c.text_rank {
                rrf += boost * text_weight * (1.0 / (r as f32 + 60.0));
            }

            fused.push((item, c, rrf));
        }
        debug.stage_timings_ms.insert("fusion".to_string(), t0.elapsed().as_millis() as u64);

        fused.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        // Step 5: optional cross-encoder rerank over the fused top rerank_k.
        let t0 = Instant::now();
        let rerank_k = self.config.caps.rerank_k.min(fused.len());
        let mut ce_scores: HashMap<String, f32> = HashMap::new();
        if params.enable_rerank && rerank_k > 0 {
            if let Some(reranker) = &self.reranker {
                let max_chars = self.config.caps.rerank_max_input_chars;
                let top: Vec<&(MemoryItem, Candidate, f32)> = fused.iter().take(rerank_k).collect();
                let documents: Vec<String> = top
                    .iter()
                    .map(|(item, _, _)| item.text.chars().take(max_chars).collect())
                    .collect();
                match reranker.rerank(&params.query, &documents).await {
                    Ok(hits) => {
                        for hit in hits {
                            if let Some((item, ..)) = top.get(hit.index) {
                                ce_scores.insert(item.memory_id.clone(), hit.score);
                            }
                        }
                    }
                    Err(e) => {
                        debug.fallbacks_used.push("rerank_skipped".to_string());
                        debug.errors.push(e);
                    }
                }
            }
        }
        debug.stage_timings_ms.insert("rerank".to_string(), t0.elapsed().as_millis() as u64);

        // Steps 6-7: Wilson blend for memory_bank items with enough uses,
        // then sort/limit/minScore.
        let t0 = Instant::now();
        let ce_blend = self.config.weights.cross_encoder_blend;
        let mut scored: Vec<(MemoryItem, Candidate, ScoreSummary)> = Vec::new();
        for (item, c, rrf) in fused {
            let was_reranked = ce_scores.contains_key(&item.memory_id);
            let ce = ce_scores.get(&item.memory_id).copied();
            let mut final_score = if let Some(ce) = ce {
                rrf * ce_blend.original_weight + ce * ce_blend.ce_weight
            } else {
                rrf
            };

            if item.tier == Tier::MemoryBank && item.stats.uses >= 3 {
                let wilson = item.stats.wilson_score as f32;
                final_score = 0.8 * final_score + 0.2 * wilson;
                if was_reranked {
                    final_score *= 1.0 + 0.2 * wilson;
                }
            }

            let summary = ScoreSummary {
                final_score,
                dense_score: c.dense_score,
                text_score: c.text_score,
                rrf_score: rrf,
                cross_encoder_score: ce,
                wilson_score: Some(item.stats.wilson_score),
                uses: item.stats.uses,
                dense_rank: c.dense_rank,
                text_rank: c.text_rank,
            };
            scored.push((item, c, summary));
        }

        scored.sort_by(|a, b| {
            b.2.final_score
                .partial_cmp(&a.2.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(min_score) = params.min_score {
            scored.retain(|(_, _, s)| s.final_score >= min_score);
        }
        scored.truncate(limit);
        debug.stage_timings_ms.insert("blend_sort".to_string(), t0.elapsed().as_millis() as u64);

        let top_score = scored.first().map(|(_, _, s)| s.final_score).unwrap_or(0.0);
        debug.confidence = if dense_contributed && text_contributed && debug.errors.is_empty() && top_score > 0.7 {
            Confidence::High
        } else if top_score > 0.4 || ((dense_contributed ^ text_contributed) && scored.len() >= 3) {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        // Step 9: zero-result diagnostic, fire-and-forget, never blocks the
        // response.
        if scored.is_empty() {
            let store = self.store.clone();
            let vector_index = self.vector_index.clone();
            let user_id = params.user_id.clone();
            tokio::spawn(async move {
                let active = store.count_active(&user_id).await.unwrap_or(0);
                let indexed = vector_index.count(&user_id).await.unwrap_or(0);
                if active != indexed {
                    tracing::warn!(
                        user_id = %user_id,
                        active,
                        indexed,
                        "zero search results with an active/indexed count mismatch"
                    );
                }
            });
        }

        let results = scored
            .into_iter()
            .enumerate()
            .map(|(position, (item, _, score))| {
                let citations = match &item.source {
                    Source::Document { book_title, originating_url, .. } => {
                        let label = book_title.clone().unwrap_or_else(|| item.memory_id.clone());
                        vec![Citation { label, url: originating_url.clone() }]
                    }
                    _ => Vec::new(),
                };
                SearchResult {
                    position,
                    tier: item.tier,
                    memory_id: item.memory_id.clone(),
                    preview: preview(&item.text),
                    content: item.text,
                    score,
                    citations,
                }
            })
            .collect();

        SearchResponse { results, debug }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::memory::{OutcomeKind, Source as MemSource, Status, StoreParams};
    use crate::store::SqliteStore;
    use crate::vector::{InMemoryVectorIndex, VectorPayload, VectorPoint};
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, crate::embedder::EmbedderError> {
            // Deterministic 2-d embedding: docker-ish text points at [1,0],
            // everything else at [0,1].
            if text.to_lowercase().contains("docker") {
                Ok(Some(vec![1.0, 0.0]))
            } else {
                Ok(Some(vec![0.0, 1.0]))
            }
        }

        fn model_id(&self) -> &str {
            "fake"
        }
    }

    async fn service() -> (
        HybridSearchService<SqliteStore, InMemoryVectorIndex, FakeEmbedder>,
        Arc<SqliteStore>,
        Arc<InMemoryVectorIndex>,
    ) {
        let store = Arc::new(SqliteStore::open(None).unwrap());
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let embedder = Arc::new(FakeEmbedder);
        let lexical = LexicalAdapter::new(
            store.clone(),
            crate::circuit::CircuitBreaker::new("bm25", crate::config::CircuitBreakerSettings::default()),
        );
        let svc = HybridSearchService::new(store.clone(), vector_index.clone(), embedder, lexical, None, Config::default());
        (svc, store, vector_index)
    }

    #[tokio::test]
    async fn hybrid_search_ranks_dense_and_lexical_hits() {
        let (svc, store, vector_index) = service().await;
        let item = store
            .store(StoreParams::new(
                "u1",
                "Docker networking uses a bridge by default",
                Tier::Patterns,
                MemSource::SystemSeed { seed_name: "t".into() },
            ))
            .await
            .unwrap();
        vector_index
            .upsert(vec![VectorPoint {
                memory_id: item.memory_id.clone(),
                user_id: "u1".to_string(),
                vector: vec![1.0, 0.0],
                payload: VectorPayload {
                    tier: Tier::Patterns,
                    status: Status::Active,
                    content: item.text.clone(),
                    uses: 0,
                    composite_score: 0.5,
                },
            }])
            .await
            .unwrap();

        let response = svc.search(SearchParams::new("u1", "docker bridge networking")).await;
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].memory_id, item.memory_id);
        assert!(response.results[0].score.final_score > 0.0);
    }

    #[tokio::test]
    async fn working_tier_conversation_snippets_are_dropped() {
        let (svc, store, _vector_index) = service().await;
        store
            .store(StoreParams::new(
                "u1",
                "User: how do I restart docker",
                Tier::Working,
                MemSource::Conversation { conversation_id: "c1".into(), message_id: "m1".into() },
            ))
            .await
            .unwrap();

        let response = svc.search(SearchParams::new("u1", "restart docker")).await;
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn memory_bank_items_blend_in_wilson_score_past_three_uses() {
        let (svc, store, vector_index) = service().await;
        let item = store
            .store(StoreParams::new(
                "u1",
                "docker compose restarts unhealthy containers automatically",
                Tier::MemoryBank,
                MemSource::SystemSeed { seed_name: "t".into() },
            ))
            .await
            .unwrap();
        for _ in 0..3 {
            store
                .record_outcome(&item.memory_id, "u1", OutcomeKind::Worked, 1.0)
                .await
                .unwrap();
        }
        vector_index
            .upsert(vec![VectorPoint {
                memory_id: item.memory_id.clone(),
                user_id: "u1".to_string(),
                vector: vec![1.0, 0.0],
                payload: VectorPayload {
                    tier: Tier::MemoryBank,
                    status: Status::Active,
                    content: item.text.clone(),
                    uses: 3,
                    composite_score: 0.5,
                },
            }])
            .await
            .unwrap();

        let response = svc.search(SearchParams::new("u1", "docker compose")).await;
        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].score.wilson_score.unwrap() > 0.5);
    }

    #[test]
    fn preview_truncates_long_text_with_ellipsis() {
        let long = "a".repeat(250);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 1);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn preview_keeps_short_text_unchanged() {
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn repeated_query_reuses_the_cached_embedding() {
        let (svc, _store, _vector_index) = service().await;
        let _ = svc.search(SearchParams::new("u1", "docker bridge")).await;
        assert!(svc
            .query_cache
            .lock()
            .unwrap()
            .contains(&"docker bridge".to_string()));
        let _ = svc.search(SearchParams::new("u1", "docker bridge")).await;
        assert_eq!(svc.query_cache.lock().unwrap().len(), 1);
    }
}
