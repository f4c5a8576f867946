//! Content KG (spec.md §4.7): an entity co-occurrence graph built from
//! whatever [`extract_entities`](super::extract_entities) pulls out of
//! stored text, used to boost related memories and surface neighbours for
//! the prompt builder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;

use crate::error::StorageResult;
use crate::kg::buffer::WriteBuffer;
use crate::store::SqliteStore;

const MAX_BOOST_PER_MEMORY: f64 = 0.5;

/// How often the background task drains the write buffer in production.
const FLUSH_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
enum ContentOp {
    NodeUpsert {
        user_id: String,
        node_id: String,
        memory_id: String,
        quality_delta: f64,
    },
    EdgeUpsert {
        user_id: String,
        source_id: String,
        target_id: String,
    },
}

pub struct ContentKg {
    store: Arc<SqliteStore>,
    buffer: WriteBuffer<ContentOp>,
}

impl ContentKg {
    pub fn new(store: Arc<SqliteStore>, test_mode: bool) -> Self {
        Self {
            store,
            buffer: WriteBuffer::new(test_mode),
        }
    }

    /// Enqueues node upserts for every entity and pairwise co-occurrence
    /// edges between them; flushes immediately in test mode.
    pub fn update_content_kg(
        &self,
        user_id: &str,
        memory_id: &str,
        entities: &[String],
        importance: f64,
        confidence: f64,
    ) -> StorageResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let quality_delta = (importance * confidence).clamp(0.0, 1.0);
        let mut should_flush = false;
        for entity in entities {
            should_flush |= self.buffer.push(ContentOp::NodeUpsert {
                user_id: user_id.to_string(),
                node_id: entity.clone(),
                memory_id: memory_id.to_string(),
                quality_delta,
            });
        }
        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                should_flush |= self.buffer.push(ContentOp::EdgeUpsert {
                    user_id: user_id.to_string(),
                    source_id: entities[i].clone(),
                    target_id: entities[j].clone(),
                });
            }
        }

        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Public flush entry point for callers outside the interval task: an
    /// explicit shutdown drain, or a caller that needs read-after-write
    /// consistency without waiting for the next tick.
    pub fn flush_writes(&self) -> StorageResult<()> {
        self.flush()
    }

    /// Spawns the background task that drains the write buffer every
    /// [`FLUSH_INTERVAL`] in production mode. In test mode every push
    /// already flushes immediately, so the interval would have nothing to
    /// do; callers still get a handle back, but it's only worth spawning
    /// once per live `ContentKg`.
    pub fn spawn_flush_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(err) = self.flush_writes() {
                    tracing::warn!(error = %err, "content kg: periodic flush failed");
                }
            }
        })
    }

    pub fn flush(&self) -> StorageResult<()> {
        let ops = self.buffer.drain();
        if ops.is_empty() {
            return Ok(());
        }

        let mut conn = self.store.writer();
        let tx = conn.transaction()?;
        for op in ops {
            match op {
                ContentOp::NodeUpsert { user_id, node_id, memory_id, quality_delta } => {
                    tx.execute(
                        "INSERT INTO kg_nodes (user_id, node_id, label, node_type, mentions, quality_sum, memory_ids) \
                         VALUES (?1, ?2, ?2, 'entity', 0, 0.0, '[]') \
                         ON CONFLICT(user_id, node_id) DO NOTHING",
                        params![user_id, node_id],
                    )?;
                    let memory_ids_json: String = tx.query_row(
                        "SELECT memory_ids FROM kg_nodes WHERE user_id = ?1 AND node_id = ?2",
                        params![user_id, node_id],
                        |r| r.get(0),
                    )?;
                    let mut memory_ids: Vec<String> =
                        serde_json::from_str(&memory_ids_json).unwrap_or_default();
                    if !memory_ids.contains(&memory_id) {
                        memory_ids.push(memory_id);
                    }
                    let memory_ids_json = serde_json::to_string(&memory_ids).unwrap_or_else(|_| "[]".to_string());
                    tx.execute(
                        "UPDATE kg_nodes SET mentions = mentions + 1, quality_sum = quality_sum + ?1, memory_ids = ?2 \
                         WHERE user_id = ?3 AND node_id = ?4",
                        params![quality_delta, memory_ids_json, user_id, node_id],
                    )?;
                }
                ContentOp::EdgeUpsert { user_id, source_id, target_id } => {
                    let (a, b) = if source_id <= target_id {
                        (source_id, target_id)
                    } else {
                        (target_id, source_id)
                    };
                    let edge_id = format!("{a}|{b}");
                    tx.execute(
                        "INSERT INTO kg_edges (user_id, edge_id, source_id, target_id, relation_type, weight) \
                         VALUES (?1, ?2, ?3, ?4, 'co_occurs', 1.0) \
                         ON CONFLICT(user_id, edge_id) DO UPDATE SET weight = weight + 1.0",
                        params![user_id, edge_id, a, b],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Boost per memory id, capped at [`MAX_BOOST_PER_MEMORY`], derived from
    /// the average quality of the entity nodes that reference it.
    pub fn get_entity_boosts(
        &self,
        user_id: &str,
        memory_ids: &[String],
    ) -> StorageResult<HashMap<String, f64>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT mentions, quality_sum, memory_ids FROM kg_nodes WHERE user_id = ?1",
        )?;
        let rows: Vec<(i64, f64, String)> = stmt
            .query_map(params![user_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut boosts: HashMap<String, f64> = HashMap::new();
        for (mentions, quality_sum, memory_ids_json) in rows {
            if mentions == 0 {
                continue;
            }
            let avg_quality = quality_sum / mentions as f64;
            let node_memory_ids: Vec<String> = serde_json::from_str(&memory_ids_json).unwrap_or_default();
            for mid in &node_memory_ids {
                if memory_ids.contains(mid) {
                    let entry = boosts.entry(mid.clone()).or_insert(0.0);
                    *entry = (*entry + avg_quality).min(MAX_BOOST_PER_MEMORY);
                }
            }
        }
        Ok(boosts)
    }

    /// Top-quality neighbours of `labels` by edge weight, deduplicated and
    /// excluding the seed labels themselves.
    pub fn get_related_entities(
        &self,
        user_id: &str,
        labels: &[String],
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, weight FROM kg_edges WHERE user_id = ?1",
        )?;
        let rows: Vec<(String, String, f64)> = stmt
            .query_map(params![user_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut neighbour_weight: HashMap<String, f64> = HashMap::new();
        for (source, target, weight) in rows {
            if labels.contains(&source) && !labels.contains(&target) {
                *neighbour_weight.entry(target).or_insert(0.0) += weight;
            } else if labels.contains(&target) && !labels.contains(&source) {
                *neighbour_weight.entry(source).or_insert(0.0) += weight;
            }
        }

        let mut ranked: Vec<(String, f64)> = neighbour_weight.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(label, _)| label).collect())
    }

    /// Removes `memory_id` from every node's `memory_ids`, then deletes
    /// nodes left with no references and any edge incident on them.
    pub fn cleanup_memory_references(&self, user_id: &str, memory_id: &str) -> StorageResult<()> {
        let mut conn = self.store.writer();
        let tx = conn.transaction()?;
        let rows: Vec<(String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT node_id, memory_ids FROM kg_nodes WHERE user_id = ?1",
            )?;
            stmt.query_map(params![user_id], |r| Ok((r.get(0)?, r.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut orphaned = Vec::new();
        for (node_id, memory_ids_json) in rows {
            let mut memory_ids: Vec<String> = serde_json::from_str(&memory_ids_json).unwrap_or_default();
            let before = memory_ids.len();
            memory_ids.retain(|m| m != memory_id);
            if memory_ids.len() != before {
                if memory_ids.is_empty() {
                    orphaned.push(node_id);
                } else {
                    let json = serde_json::to_string(&memory_ids).unwrap_or_else(|_| "[]".to_string());
                    tx.execute(
                        "UPDATE kg_nodes SET memory_ids = ?1 WHERE user_id = ?2 AND node_id = ?3",
                        params![json, user_id, node_id],
                    )?;
                }
            }
        }

        for node_id in orphaned {
            tx.execute(
                "DELETE FROM kg_edges WHERE user_id = ?1 AND (source_id = ?2 OR target_id = ?2)",
                params![user_id, node_id],
            )?;
            tx.execute(
                "DELETE FROM kg_nodes WHERE user_id = ?1 AND node_id = ?2",
                params![user_id, node_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
