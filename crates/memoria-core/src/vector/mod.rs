//! Vector Index Adapter (spec.md §4.5)
//!
//! Upsert, search, filter, and count points keyed by memory id. All queries
//! scope to `user_id` and default to `status = active`. Same circuit
//! breaker contract as the lexical adapter (callers wrap calls through
//! [`crate::circuit::CircuitBreaker`]).

#[cfg(feature = "vector-search")]
mod usearch_backend;
#[cfg(feature = "vector-search")]
pub use usearch_backend::UsearchVectorIndex;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::memory::{Status, Tier};

#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorIndexError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("index error: {0}")]
    Backend(String),
}

/// Payload stored alongside a vector point, used to re-materialise result
/// metadata without a round trip to the document store.
#[derive(Debug, Clone)]
pub struct VectorPayload {
    pub tier: Tier,
    pub status: Status,
    pub content: String,
    pub uses: u32,
    /// The item's Wilson score at index time.
    pub composite_score: f64,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub memory_id: String,
    pub user_id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A single hit from a vector search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub memory_id: String,
    /// 0-based position in the result list.
    pub position: usize,
    pub score: f32,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, Default)]
pub struct VectorSearchParams {
    pub tiers: Option<Vec<Tier>>,
    pub status: Option<Status>,
    /// Restrict the search to this id set (entity pre-filter).
    pub filter_ids: Option<Vec<String>>,
    pub limit: usize,
}

#[async_trait]
pub trait VectorIndexAdapter: Send + Sync {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), VectorIndexError>;
    async fn delete(&self, user_id: &str, ids: &[String]) -> Result<(), VectorIndexError>;
    async fn search(
        &self,
        user_id: &str,
        vector: &[f32],
        params: VectorSearchParams,
    ) -> Result<Vec<VectorHit>, VectorIndexError>;
    async fn count(&self, user_id: &str) -> Result<u64, VectorIndexError>;

    /// Entity pre-filter: returns the memory ids whose payload content
    /// contains any of `words`. Used by the hybrid search service to scope
    /// a subsequent `search` call via `filter_ids`. An empty result means
    /// "no matches" - the caller falls back to unfiltered search.
    async fn filter_by_entities(
        &self,
        user_id: &str,
        words: &[String],
        limit: usize,
    ) -> Result<Vec<String>, VectorIndexError>;
}

/// Brute-force, dependency-free implementation used by default and in
/// tests. Cosine similarity over an in-process per-user point list -
/// adequate for the corpora this core actually indexes (tens of thousands
/// of points per user, not billions).
#[derive(Default)]
pub struct InMemoryVectorIndex {
    points: RwLock<HashMap<String, Vec<VectorPoint>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndexAdapter for InMemoryVectorIndex {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), VectorIndexError> {
        let mut guard = self.points.write().unwrap();
        for point in points {
            let bucket = guard.entry(point.user_id.clone()).or_default();
            if let Some(existing) = bucket.iter_mut().find(|p| p.memory_id == point.memory_id) {
                *existing = point;
            } else {
                bucket.push(point);
            }
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, ids: &[String]) -> Result<(), VectorIndexError> {
        let mut guard = self.points.write().unwrap();
        if let Some(bucket) = guard.get_mut(user_id) {
            bucket.retain(|p| !ids.contains(&p.memory_id));
        }
        Ok(())
    }

    async fn search(
        &self,
        user_id: &str,
        vector: &[f32],
        params: VectorSearchParams,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        let guard = self.points.read().unwrap();
        let Some(bucket) = guard.get(user_id) else {
            return Ok(Vec::new());
        };

        let status = params.status.unwrap_or(Status::Active);
        let mut scored: Vec<(f32, &VectorPoint)> = bucket
            .iter()
            .filter(|p| p.payload.status == status)
            .filter(|p| {
                params
                    .tiers
                    .as_ref()
                    .is_none_or(|tiers| tiers.contains(&p.payload.tier))
            })
            .filter(|p| {
                params
                    .filter_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&p.memory_id))
            })
            .map(|p| (crate::embedder::cosine_similarity(vector, &p.vector), p))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let limit = if params.limit == 0 { scored.len() } else { params.limit };
        Ok(scored
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(position, (score, point))| VectorHit {
                memory_id: point.memory_id.clone(),
                position,
                score,
                payload: point.payload.clone(),
            })
            .collect())
    }

    async fn count(&self, user_id: &str) -> Result<u64, VectorIndexError> {
        let guard = self.points.read().unwrap();
        Ok(guard.get(user_id).map(|b| b.len()).unwrap_or(0) as u64)
    }

    async fn filter_by_entities(
        &self,
        user_id: &str,
        words: &[String],
        limit: usize,
    ) -> Result<Vec<String>, VectorIndexError> {
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.points.read().unwrap();
        let Some(bucket) = guard.get(user_id) else {
            return Ok(Vec::new());
        };
        let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let matches: Vec<String> = bucket
            .iter()
            .filter(|p| p.payload.status == Status::Active)
            .filter(|p| {
                let content = p.payload.content.to_lowercase();
                lowered.iter().any(|w| content.contains(w.as_str()))
            })
            .take(limit)
            .map(|p| p.memory_id.clone())
            .collect();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, tier: Tier) -> VectorPoint {
        VectorPoint {
            memory_id: id.to_string(),
            user_id: "u1".to_string(),
            vector,
            payload: VectorPayload {
                tier,
                status: Status::Active,
                content: format!("content for {id}"),
                uses: 0,
                composite_score: 0.5,
            },
        }
    }

    #[tokio::test]
    async fn upsert_then_search_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(vec![
                point("a", vec![1.0, 0.0], Tier::Working),
                point("b", vec![0.0, 1.0], Tier::Working),
            ])
            .await
            .unwrap();

        let hits = index
            .search(
                "u1",
                &[1.0, 0.0],
                VectorSearchParams {
                    limit: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(hits[0].memory_id, "a");
        assert_eq!(hits[0].position, 0);
    }

    #[tokio::test]
    async fn inactive_points_excluded_by_default() {
        let index = InMemoryVectorIndex::new();
        let mut archived = point("c", vec![1.0, 0.0], Tier::Working);
        archived.payload.status = Status::Archived;
        index.upsert(vec![archived]).await.unwrap();

        let hits = index
            .search(
                "u1",
                &[1.0, 0.0],
                VectorSearchParams {
                    limit: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn filter_by_entities_empty_falls_back() {
        let index = InMemoryVectorIndex::new();
        index.upsert(vec![point("a", vec![1.0, 0.0], Tier::Working)]).await.unwrap();
        let ids = index
            .filter_by_entities("u1", &["docker".to_string()], 10)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
