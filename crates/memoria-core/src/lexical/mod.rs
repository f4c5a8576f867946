//! Lexical Adapter (spec.md §4.4): BM25-like search via the document
//! store's FTS5 index, circuit-broken, with `getActiveCount`/
//! `getMaxUpdatedAt` for the search service's cache-coherence check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::circuit::CircuitBreaker;
use crate::error::StorageError;
use crate::memory::{LexicalHit, MemoryStore, Tier, TextSearchOptions};

pub struct LexicalAdapter<S: MemoryStore> {
    store: Arc<S>,
    breaker: CircuitBreaker,
}

#[derive(Debug, Clone)]
pub struct LexicalSearchParams {
    pub user_id: String,
    pub query: String,
    pub tiers: Option<Vec<Tier>>,
    pub limit: usize,
    pub timeout_ms: u64,
}

impl<S: MemoryStore> LexicalAdapter<S> {
    pub fn new(store: Arc<S>, breaker: CircuitBreaker) -> Self {
        Self { store, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Returns an empty result (not an error) on breaker-open or timeout,
    /// matching the adapter's fail-open contract on the search path.
    pub async fn search(&self, params: LexicalSearchParams) -> Vec<LexicalHit> {
        if self.breaker.is_open() {
            tracing::debug!(user_id = %params.user_id, "lexical adapter: circuit open, skipping");
            return Vec::new();
        }

        let opts = TextSearchOptions {
            tiers: params.tiers,
            statuses: vec![crate::memory::Status::Active],
            limit: params.limit,
            timeout_ms: params.timeout_ms,
        };

        let deadline = Duration::from_millis(params.timeout_ms);
        let result = tokio::time::timeout(
            deadline,
            self.store.text_search(&params.user_id, &params.query, opts),
        )
        .await;

        match result {
            Ok(Ok(hits)) => {
                self.breaker.record_success();
                hits
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "lexical adapter: store error");
                self.breaker.record_failure();
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(timeout_ms = params.timeout_ms, "lexical adapter: timed out");
                self.breaker.record_failure();
                Vec::new()
            }
        }
    }

    pub async fn get_active_count(&self, user_id: &str, tier: Option<Tier>) -> Result<u64, StorageError> {
        let counts = self.store.count_by_tier(user_id).await?;
        Ok(match tier {
            Some(t) => counts.get(&t).copied().unwrap_or(0),
            None => counts.values().sum(),
        })
    }

    /// Max `updated_at` across the user's active memories; used alongside
    /// `get_active_count` for the cache-coherence check in the search
    /// service's zero-result diagnostic.
    pub async fn get_max_updated_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let mut filters = crate::memory::QueryFilters::new(user_id);
        filters.sort_by = crate::memory::SortField::UpdatedAt;
        filters.descending = true;
        filters.limit = 1;
        let items = self.store.query(filters).await?;
        Ok(items.first().map(|i| i.updated_at))
    }
}
