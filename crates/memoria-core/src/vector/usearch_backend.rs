//! USearch-backed [`VectorIndexAdapter`] (HNSW, cosine metric).
//!
//! One `usearch::Index` per user, keyed by a `next_id` counter; the string
//! `memory_id` <-> numeric key mapping and the result payload both live
//! outside usearch (it only stores the raw vectors).

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{VectorHit, VectorIndexAdapter, VectorIndexError, VectorPayload, VectorPoint, VectorSearchParams};
use crate::memory::Status;

const DEFAULT_CONNECTIVITY: usize = 16;
const DEFAULT_EXPANSION_ADD: usize = 128;
const DEFAULT_EXPANSION_SEARCH: usize = 64;

struct UserIndex {
    index: Index,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    payloads: HashMap<String, VectorPayload>,
    next_id: u64,
}

impl UserIndex {
    fn new(dimensions: usize) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorIndexError::Backend(e.to_string()))?;
        Ok(Self {
            index,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            payloads: HashMap::new(),
            next_id: 0,
        })
    }

    fn ensure_capacity(&self) -> Result<(), VectorIndexError> {
        let size = self.index.size();
        let capacity = self.index.capacity();
        if size >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| VectorIndexError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn upsert(&mut self, point: VectorPoint) -> Result<(), VectorIndexError> {
        if let Some(&id) = self.key_to_id.get(&point.memory_id) {
            self.index
                .remove(id)
                .map_err(|e| VectorIndexError::Backend(e.to_string()))?;
            self.ensure_capacity()?;
            self.index
                .add(id, &point.vector)
                .map_err(|e| VectorIndexError::Backend(e.to_string()))?;
        } else {
            self.ensure_capacity()?;
            let id = self.next_id;
            self.next_id += 1;
            self.index
                .add(id, &point.vector)
                .map_err(|e| VectorIndexError::Backend(e.to_string()))?;
            self.key_to_id.insert(point.memory_id.clone(), id);
            self.id_to_key.insert(id, point.memory_id.clone());
        }
        self.payloads.insert(point.memory_id.clone(), point.payload);
        Ok(())
    }

    fn remove(&mut self, memory_id: &str) -> Result<(), VectorIndexError> {
        if let Some(id) = self.key_to_id.remove(memory_id) {
            self.id_to_key.remove(&id);
            self.payloads.remove(memory_id);
            self.index
                .remove(id)
                .map_err(|e| VectorIndexError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

pub struct UsearchVectorIndex {
    dimensions: usize,
    users: RwLock<HashMap<String, UserIndex>>,
}

impl UsearchVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            users: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndexAdapter for UsearchVectorIndex {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), VectorIndexError> {
        let mut users = self.users.write().unwrap();
        for point in points {
            if point.vector.len() != self.dimensions {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: self.dimensions,
                    got: point.vector.len(),
                });
            }
            let user = match users.get_mut(&point.user_id) {
                Some(u) => u,
                None => {
                    users.insert(point.user_id.clone(), UserIndex::new(self.dimensions)?);
                    users.get_mut(&point.user_id).unwrap()
                }
            };
            user.upsert(point)?;
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, ids: &[String]) -> Result<(), VectorIndexError> {
        let mut users = self.users.write().unwrap();
        if let Some(user) = users.get_mut(user_id) {
            for id in ids {
                user.remove(id)?;
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        user_id: &str,
        vector: &[f32],
        params: VectorSearchParams,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        if vector.len() != self.dimensions {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        let users = self.users.read().unwrap();
        let Some(user) = users.get(user_id) else {
            return Ok(Vec::new());
        };
        if user.index.size() == 0 {
            return Ok(Vec::new());
        }

        let status = params.status.unwrap_or(Status::Active);
        // usearch has no server-side filter predicate, so over-fetch and
        // filter client-side. Same over-fetch strategy the hybrid search
        // service uses for the lexical leg.
        let fetch = if params.limit == 0 { 50 } else { params.limit * 4 };
        let results = user
            .index
            .search(vector, fetch.max(1))
            .map_err(|e| VectorIndexError::Backend(e.to_string()))?;

        let mut hits = Vec::new();
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            let Some(memory_id) = user.id_to_key.get(key) else { continue };
            let Some(payload) = user.payloads.get(memory_id) else { continue };
            if payload.status != status {
                continue;
            }
            if let Some(tiers) = &params.tiers {
                if !tiers.contains(&payload.tier) {
                    continue;
                }
            }
            if let Some(filter_ids) = &params.filter_ids {
                if !filter_ids.contains(memory_id) {
                    continue;
                }
            }
            hits.push(VectorHit {
                memory_id: memory_id.clone(),
                position: hits.len(),
                score: 1.0 - distance,
                payload: payload.clone(),
            });
            if params.limit != 0 && hits.len() >= params.limit {
                break;
            }
        }
        Ok(hits)
    }

    async fn count(&self, user_id: &str) -> Result<u64, VectorIndexError> {
        let users = self.users.read().unwrap();
        Ok(users.get(user_id).map(|u| u.index.size() as u64).unwrap_or(0))
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
        let users = self.users.read().unwrap();
        let Some(user) = users.get(user_id) else {
            return Ok(Vec::new());
        };
        let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let matches = user
            .payloads
            .iter()
            .filter(|(_, payload)| payload.status == Status::Active)
            .filter(|(_, payload)| {
                let content = payload.content.to_lowercase();
                lowered.iter().any(|w| content.contains(w.as_str()))
            })
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect();
        Ok(matches)
    }
}
