//! Known Solutions (spec.md §4.8): the pattern-tier fast path. Pins a
//! `(user_id, problem_hash)` to a memory id once it has resolved that
//! problem, and hands back a synthetic top-ranked result on repeat so the
//! hybrid pipeline is bypassed entirely for recognised problems.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::StorageResult;
use crate::memory::{MemoryStore, Status, Tier};
use crate::search::{preview, Citation, ScoreSummary, SearchResult};
use crate::store::SqliteStore;

/// `final_score` stamped onto a known-solution hit, chosen to sort above
/// anything the hybrid pipeline itself can ever produce.
pub const KNOWN_SOLUTION_SCORE: f32 = 999.0;

pub struct KnownSolutions<S: MemoryStore> {
    store: Arc<SqliteStore>,
    memory_store: Arc<S>,
}

impl<S: MemoryStore> KnownSolutions<S> {
    pub fn new(store: Arc<SqliteStore>, memory_store: Arc<S>) -> Self {
        Self { store, memory_store }
    }

    /// Pins `memory_id` as the solution for `problem_hash`, or increments
    /// the existing pin's `success_count` on a repeat.
    pub fn record_known_solution(
        &self,
        user_id: &str,
        problem_hash: &str,
        memory_id: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.store.writer();
        conn.execute(
            "INSERT INTO known_solutions (user_id, problem_hash, memory_id, success_count, first_used_at, last_used_at) \
             VALUES (?1, ?2, ?3, 1, ?4, ?4) \
             ON CONFLICT(user_id, problem_hash) DO UPDATE SET \
                memory_id = excluded.memory_id, \
                success_count = known_solutions.success_count + 1, \
                last_used_at = excluded.last_used_at",
            params![user_id, problem_hash, memory_id, now],
        )?;
        Ok(())
    }

    /// Returns a synthetic top-ranked [`SearchResult`] for `problem_hash`,
    /// or `None` when there is no pin, the pinned memory id no longer
    /// exists, it has left the `patterns` tier, or it is no longer
    /// searchable - a pin only ever short-circuits the search path while
    /// its target is still a valid pattern.
    pub async fn get_known_solution(
        &self,
        user_id: &str,
        problem_hash: &str,
    ) -> StorageResult<Option<SearchResult>> {
        let memory_id: Option<String> = {
            let conn = self.store.reader();
            conn.query_row(
                "SELECT memory_id FROM known_solutions WHERE user_id = ?1 AND problem_hash = ?2",
                params![user_id, problem_hash],
                |r| r.get(0),
            )
            .optional()?
        };
        let Some(memory_id) = memory_id else { return Ok(None) };

        let Some(item) = self.memory_store.get_by_id(&memory_id, user_id).await? else {
            return Ok(None);
        };
        if item.tier != Tier::Patterns || item.status != Status::Active {
            return Ok(None);
        }

        Ok(Some(SearchResult {
            position: 0,
            tier: item.tier,
            memory_id: item.memory_id.clone(),
            preview: preview(&item.text),
            content: item.text,
            score: ScoreSummary {
                final_score: KNOWN_SOLUTION_SCORE,
                wilson_score: Some(item.stats.wilson_score),
                uses: item.stats.uses,
                ..Default::default()
            },
            citations: Vec::<Citation>::new(),
        }))
    }
}
