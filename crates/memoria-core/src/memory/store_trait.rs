//! The `MemoryStore` contract: CRUD over memory items with versioning,
//! text search, outcome recording, and tier bookkeeping.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::memory::{Language, MemoryItem, MemoryVersion, OutcomeKind, Source, Status, Tier};

/// Parameters for `store`.
#[derive(Debug, Clone)]
pub struct StoreParams {
    pub user_id: String,
    pub text: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub entities: Vec<String>,
    pub language: Language,
    pub tier: Tier,
    pub always_inject: bool,
    pub source: Source,
    pub importance: f64,
    pub confidence: f64,
    pub expires_at: Option<DateTime<Utc>>,
    pub persona_id: Option<String>,
    pub persona_display_name: Option<String>,
}

impl StoreParams {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>, tier: Tier, source: Source) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            summary: None,
            tags: Vec::new(),
            entities: Vec::new(),
            language: Language::None,
            tier,
            always_inject: false,
            source,
            importance: 0.5,
            confidence: 0.5,
            expires_at: None,
            persona_id: None,
            persona_display_name: None,
        }
    }
}

/// Parameters for `update`. `None` fields leave the existing value
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateParams {
    pub text: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub entities: Option<Vec<String>>,
    pub tier: Option<Tier>,
    pub status: Option<Status>,
    pub always_inject: Option<bool>,
    pub importance: Option<f64>,
    pub confidence: Option<f64>,
}

/// Sortable fields for `query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    UpdatedAt,
    CreatedAt,
    WilsonScore,
    Uses,
}

/// Filters accepted by `query`. Default status is `Active`.
#[derive(Debug, Clone)]
pub struct QueryFilters {
    pub user_id: String,
    pub tiers: Option<Vec<Tier>>,
    pub statuses: Vec<Status>,
    pub tags: Option<Vec<String>>,
    pub entities: Option<Vec<String>>,
    pub min_wilson: Option<f64>,
    pub sort_by: SortField,
    pub descending: bool,
    pub limit: usize,
    pub offset: usize,
}

impl QueryFilters {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tiers: None,
            statuses: vec![Status::Active],
            tags: None,
            entities: None,
            min_wilson: None,
            sort_by: SortField::UpdatedAt,
            descending: true,
            limit: 50,
            offset: 0,
        }
    }
}

/// Options for `text_search`. Default status is `Active`.
#[derive(Debug, Clone)]
pub struct TextSearchOptions {
    pub tiers: Option<Vec<Tier>>,
    pub statuses: Vec<Status>,
    pub limit: usize,
    pub timeout_ms: u64,
}

impl Default for TextSearchOptions {
    fn default() -> Self {
        Self {
            tiers: None,
            statuses: vec![Status::Active],
            limit: 20,
            timeout_ms: 2_000,
        }
    }
}

/// A single row of a lexical text search result, ready for RRF fusion.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub memory_id: String,
    /// 1-based rank within this result set.
    pub rank: usize,
    pub text_score: f32,
    /// `1 / (rank + K)`, K = 60.
    pub normalized_score: f32,
}

/// Document-of-record store: authoritative persistence for memory items
/// plus the supporting tables named in spec.md §6. All operations carry
/// per-operation timeouts at the implementation layer and never throw into
/// the request path - on timeout or error they return an empty result or
/// `false`.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, params: StoreParams) -> StorageResult<MemoryItem>;
    async fn update(&self, memory_id: &str, user_id: &str, params: UpdateParams) -> StorageResult<MemoryItem>;
    async fn get_by_id(&self, memory_id: &str, user_id: &str) -> StorageResult<Option<MemoryItem>>;
    async fn delete(&self, memory_id: &str, user_id: &str) -> StorageResult<bool>;
    async fn archive(&self, memory_id: &str, user_id: &str, reason: Option<&str>) -> StorageResult<bool>;

    async fn query(&self, filters: QueryFilters) -> StorageResult<Vec<MemoryItem>>;
    async fn text_search(&self, user_id: &str, query: &str, opts: TextSearchOptions) -> StorageResult<Vec<LexicalHit>>;

    async fn get_always_inject(&self, user_id: &str) -> StorageResult<Vec<MemoryItem>>;

    /// Dense map with zero for missing tiers.
    async fn count_by_tier(&self, user_id: &str) -> StorageResult<HashMap<Tier, u64>>;

    async fn count_active(&self, user_id: &str) -> StorageResult<u64>;

    /// Atomically record an outcome: increments `uses`, the per-outcome
    /// counter, `success_count`, recomputes `wilson_score`/`success_rate`,
    /// and appends an audit record. See the outcome module for the
    /// orchestration; this is the storage-layer primitive it calls.
    async fn record_outcome(
        &self,
        memory_id: &str,
        user_id: &str,
        outcome: OutcomeKind,
        score_delta: f64,
    ) -> StorageResult<MemoryItem>;

    /// Append-only action-outcome record for downstream rollups.
    async fn record_action_outcome(
        &self,
        user_id: &str,
        context_type: &str,
        action: &str,
        tier: Option<Tier>,
        outcome: OutcomeKind,
    ) -> StorageResult<()>;

    async fn update_embedding_info(
        &self,
        memory_id: &str,
        user_id: &str,
        model_id: &str,
        dimensions: usize,
        vector_hash: &str,
    ) -> StorageResult<()>;

    /// Items whose embedding is null or whose `last_indexed_at` is older
    /// than the item's `updated_at`.
    async fn get_memories_needing_reindex(&self, user_id: &str, limit: usize) -> StorageResult<Vec<MemoryItem>>;

    async fn get_version_history(&self, memory_id: &str, user_id: &str) -> StorageResult<Vec<MemoryVersion>>;
}
