//! `rusqlite` + FTS5 implementation of [`MemoryStore`].
//!
//! Mirrors the teacher's `Storage` shape: a writer/reader connection pair
//! behind `Mutex`, `&self` methods so the type is `Send + Sync` and callers
//! hold it as `Arc<SqliteStore>`. Unlike the teacher, every trait method is
//! `async fn` - the body still runs the synchronous `rusqlite` calls
//! directly (local SQLite round-trips are microseconds, not worth a
//! `spawn_blocking`), and callers apply `tokio::time::timeout` at the call
//! site for the per-operation deadlines in spec §5.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::memory::{
    EmbeddingMeta, Language, MemoryItem, MemoryStats, MemoryStore, MemoryVersion, OutcomeKind,
    PersonalityAttribution, QueryFilters, SortField, Source, Status, StoreParams, Tier,
    TextSearchOptions, UpdateParams, VersionTransition,
};
use crate::wilson::wilson_default;

use super::migrations;

/// Document-of-record store. Owns the SQLite connections for every table
/// named in spec.md §6 - memory items are exposed through [`MemoryStore`];
/// knowledge-graph, registry, and known-solution tables are exposed as
/// plain inherent methods consumed directly by their owning modules, the
/// way the teacher's `Storage` carries intentions/insights/connections
/// alongside `knowledge_nodes`.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

impl SqliteStore {
    /// Open (and migrate) the store at `path`, or `None` for an in-memory
    /// database (used by tests and the `tests/e2e` harness).
    pub fn open(path: Option<PathBuf>) -> StorageResult<Self> {
        let writer_conn = match &path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };
        configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = match &path {
            Some(p) => Connection::open(p)?,
            // An in-memory reader would be a *different* database; tests
            // that need a reader/writer split use a file-backed temp path.
            None => Connection::open_in_memory()?,
        };
        configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    pub(crate) fn writer(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn reader(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Row <-> MemoryItem mapping
// ============================================================================

const MEMORY_ITEM_COLUMNS: &str = "memory_id, user_id, text, summary, tags, entities, language, \
    tier, status, always_inject, source_kind, source_json, importance, confidence, \
    mentioned_count, quality_score, uses, worked, partial, unknown_outcome, failed, \
    success_count, success_rate, wilson_score, last_used_at, current_version, \
    supersedes_memory_id, embedding_model_id, embedding_dimensions, embedding_vector_hash, \
    embedding_last_indexed_at, created_at, updated_at, archived_at, expires_at, persona_id, \
    persona_display_name";

fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn row_to_memory_item(row: &rusqlite::Row) -> rusqlite::Result<MemoryItem> {
    let tags: String = row.get("tags")?;
    let entities: String = row.get("entities")?;
    let source_json: String = row.get("source_json")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    let tier_str: String = row.get("tier")?;
    let status_str: String = row.get("status")?;
    let language_str: String = row.get("language")?;

    Ok(MemoryItem {
        memory_id: row.get("memory_id")?,
        user_id: row.get("user_id")?,
        text: row.get("text")?,
        summary: row.get("summary")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        entities: serde_json::from_str(&entities).unwrap_or_default(),
        language: parse_language(&language_str),
        tier: Tier::parse_name(&tier_str).unwrap_or(Tier::Working),
        status: Status::parse_name(&status_str).unwrap_or(Status::Active),
        always_inject: row.get::<_, i64>("always_inject")? != 0,
        source: serde_json::from_str(&source_json).unwrap_or(Source::SystemSeed {
            seed_name: "unknown".to_string(),
        }),
        importance: row.get("importance")?,
        confidence: row.get("confidence")?,
        mentioned_count: row.get::<_, i64>("mentioned_count")? as u32,
        quality_score: row.get("quality_score")?,
        stats: MemoryStats {
            uses: row.get::<_, i64>("uses")? as u32,
            worked: row.get::<_, i64>("worked")? as u32,
            partial: row.get::<_, i64>("partial")? as u32,
            unknown: row.get::<_, i64>("unknown_outcome")? as u32,
            failed: row.get::<_, i64>("failed")? as u32,
            success_count: row.get("success_count")?,
            success_rate: row.get("success_rate")?,
            wilson_score: row.get("wilson_score")?,
            last_used_at: parse_ts(row.get("last_used_at")?),
        },
        current_version: row.get::<_, i64>("current_version")? as u32,
        supersedes_memory_id: row.get("supersedes_memory_id")?,
        embedding: EmbeddingMeta {
            model_id: row.get("embedding_model_id")?,
            dimensions: row.get::<_, Option<i64>>("embedding_dimensions")?.map(|d| d as usize),
            vector_hash: row.get("embedding_vector_hash")?,
            last_indexed_at: parse_ts(row.get("embedding_last_indexed_at")?),
        },
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        archived_at: parse_ts(row.get("archived_at")?),
        expires_at: parse_ts(row.get("expires_at")?),
        personality: PersonalityAttribution {
            persona_id: row.get("persona_id")?,
            display_name: row.get("persona_display_name")?,
        },
    })
}

fn parse_language(s: &str) -> Language {
    match s {
        "he" => Language::He,
        "en" => Language::En,
        "mixed" => Language::Mixed,
        _ => Language::None,
    }
}

fn language_str(l: Language) -> &'static str {
    match l {
        Language::He => "he",
        Language::En => "en",
        Language::Mixed => "mixed",
        Language::None => "none",
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn store(&self, params: StoreParams) -> StorageResult<MemoryItem> {
        let now = Utc::now();
        let memory_id = Uuid::new_v4().to_string();
        let tags_json = serde_json::to_string(&params.tags)?;
        let entities_json = serde_json::to_string(&params.entities)?;
        let source_json = serde_json::to_string(&params.source)?;

        {
            let conn = self.writer();
            conn.execute(
                &format!(
                    "INSERT INTO memory_items ({cols}) VALUES (\
                     ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9, ?10, ?11, ?12, ?13, \
                     0, 0.0, 0, 0, 0, 0, 0, 0.0, 0.0, 0.5, NULL, 1, NULL, NULL, NULL, NULL, NULL, \
                     ?14, ?14, NULL, ?15, ?16, ?17)",
                    cols = MEMORY_ITEM_COLUMNS
                ),
                params![
                    memory_id,
                    params.user_id,
                    params.text,
                    params.summary,
                    tags_json,
                    entities_json,
                    language_str(params.language),
                    params.tier.as_str(),
                    params.always_inject as i64,
                    params.source.kind_str(),
                    source_json,
                    params.importance,
                    params.confidence,
                    now.to_rfc3339(),
                    params.expires_at.map(|d| d.to_rfc3339()),
                    params.persona_id,
                    params.persona_display_name,
                ],
            )?;

            conn.execute(
                "INSERT INTO memory_items_fts (memory_id, text, summary, tags) VALUES (?1, ?2, ?3, ?4)",
                params![memory_id, params.text, params.summary, tags_json],
            )?;

            conn.execute(
                "INSERT INTO memory_versions (memory_id, version, text, tier, status, transition, created_at) \
                 VALUES (?1, 1, ?2, ?3, 'active', 'update', ?4)",
                params![memory_id, params.text, params.tier.as_str(), now.to_rfc3339()],
            )?;
        }

        self.get_by_id(&memory_id, &params.user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(memory_id))
    }

    async fn update(&self, memory_id: &str, user_id: &str, params: UpdateParams) -> StorageResult<MemoryItem> {
        {
            let conn = self.writer();
            let current = {
                let row: Option<(String, String, String)> = conn
                    .query_row(
                        "SELECT text, tier, status FROM memory_items WHERE memory_id = ?1 AND user_id = ?2",
                        rusqlite::params![memory_id, user_id],
                        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                    )
                    .optional()?;
                row.ok_or_else(|| StorageError::NotFound(memory_id.to_string()))?
            };
            let (old_tier, old_status) = (current.1.clone(), current.2.clone());

            let new_tier = params.tier.map(|t| t.as_str().to_string()).unwrap_or(old_tier.clone());
            let new_status = params.status.map(|s| s.as_str().to_string()).unwrap_or(old_status.clone());

            let transition = if new_status == "archived" && old_status != "archived" {
                VersionTransition::Archive
            } else if new_tier != old_tier {
                VersionTransition::Promote
            } else {
                VersionTransition::Update
            };

            let now = Utc::now();
            conn.execute(
                "UPDATE memory_items SET \
                    text = COALESCE(?1, text), \
                    summary = COALESCE(?2, summary), \
                    tags = COALESCE(?3, tags), \
                    entities = COALESCE(?4, entities), \
                    tier = ?5, \
                    status = ?6, \
                    always_inject = COALESCE(?7, always_inject), \
                    importance = COALESCE(?8, importance), \
                    confidence = COALESCE(?9, confidence), \
                    current_version = current_version + 1, \
                    archived_at = CASE WHEN ?6 = 'archived' AND archived_at IS NULL THEN ?10 ELSE archived_at END, \
                    updated_at = ?10 \
                 WHERE memory_id = ?11 AND user_id = ?12",
                params![
                    params.text,
                    params.summary,
                    params.tags.map(|t| serde_json::to_string(&t).unwrap_or_default()),
                    params.entities.map(|e| serde_json::to_string(&e).unwrap_or_default()),
                    new_tier,
                    new_status,
                    params.always_inject.map(|b| b as i64),
                    params.importance,
                    params.confidence,
                    now.to_rfc3339(),
                    memory_id,
                    user_id,
                ],
            )?;

            if let Some(text) = &params.text {
                conn.execute(
                    "UPDATE memory_items_fts SET text = ?1 WHERE memory_id = ?2",
                    params![text, memory_id],
                )?;
            }

            let version: i64 = conn.query_row(
                "SELECT current_version FROM memory_items WHERE memory_id = ?1",
                params![memory_id],
                |r| r.get(0),
            )?;
            let text_for_version: String = conn.query_row(
                "SELECT text FROM memory_items WHERE memory_id = ?1",
                params![memory_id],
                |r| r.get(0),
            )?;
            conn.execute(
                "INSERT INTO memory_versions (memory_id, version, text, tier, status, transition, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    memory_id,
                    version,
                    text_for_version,
                    new_tier,
                    new_status,
                    transition_str(transition),
                    now.to_rfc3339(),
                ],
            )?;
        }

        self.get_by_id(memory_id, user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(memory_id.to_string()))
    }

    async fn get_by_id(&self, memory_id: &str, user_id: &str) -> StorageResult<Option<MemoryItem>> {
        let conn = self.reader();
        let item = conn
            .query_row(
                &format!(
                    "SELECT {cols} FROM memory_items WHERE memory_id = ?1 AND user_id = ?2",
                    cols = MEMORY_ITEM_COLUMNS
                ),
                params![memory_id, user_id],
                row_to_memory_item,
            )
            .optional()?;
        Ok(item)
    }

    async fn delete(&self, memory_id: &str, user_id: &str) -> StorageResult<bool> {
        let conn = self.writer();
        conn.execute(
            "DELETE FROM memory_items_fts WHERE memory_id = ?1",
            params![memory_id],
        )?;
        let n = conn.execute(
            "DELETE FROM memory_items WHERE memory_id = ?1 AND user_id = ?2",
            params![memory_id, user_id],
        )?;
        Ok(n > 0)
    }

    async fn archive(&self, memory_id: &str, user_id: &str, reason: Option<&str>) -> StorageResult<bool> {
        let now = Utc::now();
        let conn = self.writer();
        let n = conn.execute(
            "UPDATE memory_items SET status = 'archived', archived_at = ?1, updated_at = ?1 \
             WHERE memory_id = ?2 AND user_id = ?3 AND status != 'archived'",
            params![now.to_rfc3339(), memory_id, user_id],
        )?;
        if n > 0 {
            conn.execute(
                "INSERT INTO memory_versions (memory_id, version, text, tier, status, transition, created_at) \
                 SELECT memory_id, current_version, text, tier, status, 'archive', ?1 FROM memory_items \
                 WHERE memory_id = ?2",
                params![now.to_rfc3339(), memory_id],
            )?;
            if let Some(reason) = reason {
                conn.execute(
                    "INSERT INTO consistency_logs (user_id, kind, detail, created_at) VALUES (?1, 'archive', ?2, ?3)",
                    params![user_id, format!("{memory_id}: {reason}"), now.to_rfc3339()],
                )?;
            }
        }
        Ok(n > 0)
    }

    async fn query(&self, filters: QueryFilters) -> StorageResult<Vec<MemoryItem>> {
        let conn = self.reader();
        let mut sql = format!(
            "SELECT {cols} FROM memory_items WHERE user_id = ?1",
            cols = MEMORY_ITEM_COLUMNS
        );
        let statuses: Vec<&str> = filters.statuses.iter().map(|s| s.as_str()).collect();
        sql.push_str(&format!(
            " AND status IN ({})",
            statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",")
        ));
        if let Some(tiers) = &filters.tiers {
            sql.push_str(&format!(
                " AND tier IN ({})",
                tiers.iter().map(|t| format!("'{}'", t.as_str())).collect::<Vec<_>>().join(",")
            ));
        }
        if let Some(min_wilson) = filters.min_wilson {
            sql.push_str(&format!(" AND wilson_score >= {min_wilson}"));
        }
        let sort_col = match filters.sort_by {
            SortField::UpdatedAt => "updated_at",
            SortField::CreatedAt => "created_at",
            SortField::WilsonScore => "wilson_score",
            SortField::Uses => "uses",
        };
        sql.push_str(&format!(
            " ORDER BY {sort_col} {} LIMIT {} OFFSET {}",
            if filters.descending { "DESC" } else { "ASC" },
            filters.limit,
            filters.offset
        ));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![filters.user_id], row_to_memory_item)?;
        let mut items = Vec::new();
        for row in rows {
            let item = row?;
            if let Some(tags) = &filters.tags {
                if !tags.iter().any(|t| item.tags.contains(t)) {
                    continue;
                }
            }
            if let Some(entities) = &filters.entities {
                if !entities.iter().any(|e| item.entities.contains(e)) {
                    continue;
                }
            }
            items.push(item);
        }
        Ok(items)
    }

    async fn text_search(&self, user_id: &str, query: &str, opts: TextSearchOptions) -> StorageResult<Vec<crate::memory::LexicalHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sanitized = super::sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.reader();
        let statuses: Vec<&str> = opts.statuses.iter().map(|s| s.as_str()).collect();
        let mut sql = format!(
            "SELECT m.memory_id, bm25(memory_items_fts, 10.0, 5.0, 3.0) AS score \
             FROM memory_items_fts JOIN memory_items m ON m.memory_id = memory_items_fts.memory_id \
             WHERE memory_items_fts MATCH ?1 AND m.user_id = ?2 AND m.status IN ({})",
            statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",")
        );
        if let Some(tiers) = &opts.tiers {
            sql.push_str(&format!(
                " AND m.tier IN ({})",
                tiers.iter().map(|t| format!("'{}'", t.as_str())).collect::<Vec<_>>().join(",")
            ));
        }
        sql.push_str(&format!(" ORDER BY score LIMIT {}", opts.limit));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![sanitized, user_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?;

        let mut hits = Vec::new();
        for (idx, row) in rows.enumerate() {
            let (memory_id, raw_score) = row?;
            let rank = idx + 1;
            hits.push(crate::memory::LexicalHit {
                memory_id,
                rank,
                // bm25() in SQLite is lower-is-better; invert to a
                // positive relevance score for display.
                text_score: (-raw_score) as f32,
                normalized_score: 1.0 / (rank as f32 + 60.0),
            });
        }
        Ok(hits)
    }

    async fn get_always_inject(&self, user_id: &str) -> StorageResult<Vec<MemoryItem>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM memory_items WHERE user_id = ?1 AND always_inject = 1 AND status = 'active'",
            cols = MEMORY_ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_memory_item)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn count_by_tier(&self, user_id: &str) -> StorageResult<HashMap<Tier, u64>> {
        let conn = self.reader();
        let mut counts: HashMap<Tier, u64> = Tier::all().into_iter().map(|t| (t, 0)).collect();
        let mut stmt = conn.prepare(
            "SELECT tier, COUNT(*) FROM memory_items WHERE user_id = ?1 AND status = 'active' GROUP BY tier",
        )?;
        let rows = stmt.query_map(params![user_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (tier_str, count) = row?;
            if let Some(tier) = Tier::parse_name(&tier_str) {
                counts.insert(tier, count as u64);
            }
        }
        Ok(counts)
    }

    async fn count_active(&self, user_id: &str) -> StorageResult<u64> {
        let conn = self.reader();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_items WHERE user_id = ?1 AND status = 'active'",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    async fn record_outcome(
        &self,
        memory_id: &str,
        user_id: &str,
        outcome: OutcomeKind,
        score_delta: f64,
    ) -> StorageResult<MemoryItem> {
        let weight = outcome.success_weight();
        let outcome_col = match outcome {
            OutcomeKind::Worked => "worked",
            OutcomeKind::Partial => "partial",
            OutcomeKind::Unknown => "unknown_outcome",
            OutcomeKind::Failed => "failed",
        };
        let now = Utc::now();

        {
            let conn = self.writer();
            let n = conn.execute(
                &format!(
                    "UPDATE memory_items SET \
                        uses = uses + 1, \
                        {outcome_col} = {outcome_col} + 1, \
                        success_count = success_count + ?1, \
                        last_used_at = ?2, \
                        updated_at = ?2 \
                     WHERE memory_id = ?3 AND user_id = ?4"
                ),
                params![weight, now.to_rfc3339(), memory_id, user_id],
            )?;
            if n == 0 {
                return Err(StorageError::NotFound(memory_id.to_string()));
            }

            let (uses, success_count): (i64, f64) = conn.query_row(
                "SELECT uses, success_count FROM memory_items WHERE memory_id = ?1",
                params![memory_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            let success_rate = if uses > 0 { success_count / uses as f64 } else { 0.0 };
            let wilson = wilson_default(success_count, uses as u32);

            conn.execute(
                "UPDATE memory_items SET success_rate = ?1, wilson_score = ?2 WHERE memory_id = ?3",
                params![success_rate, wilson, memory_id],
            )?;

            conn.execute(
                "INSERT INTO memory_outcomes (memory_id, user_id, outcome, score_delta, wilson_after, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![memory_id, user_id, outcome.as_str(), score_delta, wilson, now.to_rfc3339()],
            )?;
        }

        self.get_by_id(memory_id, user_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(memory_id.to_string()))
    }

    async fn record_action_outcome(
        &self,
        user_id: &str,
        context_type: &str,
        action: &str,
        tier: Option<Tier>,
        outcome: OutcomeKind,
    ) -> StorageResult<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO action_outcomes (user_id, context_type, action, tier, outcome, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                context_type,
                action,
                tier.map(|t| t.as_str().to_string()),
                outcome.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn update_embedding_info(
        &self,
        memory_id: &str,
        user_id: &str,
        model_id: &str,
        dimensions: usize,
        vector_hash: &str,
    ) -> StorageResult<()> {
        let conn = self.writer();
        conn.execute(
            "UPDATE memory_items SET embedding_model_id = ?1, embedding_dimensions = ?2, \
             embedding_vector_hash = ?3, embedding_last_indexed_at = ?4 \
             WHERE memory_id = ?5 AND user_id = ?6",
            params![
                model_id,
                dimensions as i64,
                vector_hash,
                Utc::now().to_rfc3339(),
                memory_id,
                user_id,
            ],
        )?;
        Ok(())
    }

    async fn get_memories_needing_reindex(&self, user_id: &str, limit: usize) -> StorageResult<Vec<MemoryItem>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM memory_items WHERE user_id = ?1 AND status = 'active' \
             AND (embedding_model_id IS NULL OR embedding_last_indexed_at IS NULL OR embedding_last_indexed_at < updated_at) \
             LIMIT ?2",
            cols = MEMORY_ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_memory_item)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn get_version_history(&self, memory_id: &str, user_id: &str) -> StorageResult<Vec<MemoryVersion>> {
        let conn = self.reader();
        let belongs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_items WHERE memory_id = ?1 AND user_id = ?2",
            params![memory_id, user_id],
            |r| r.get(0),
        )?;
        if belongs == 0 {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT memory_id, version, text, tier, status, transition, created_at \
             FROM memory_versions WHERE memory_id = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![memory_id], |r| {
            let tier_str: String = r.get(3)?;
            let status_str: String = r.get(4)?;
            let transition_str: String = r.get(5)?;
            let created_at: String = r.get(6)?;
            Ok(MemoryVersion {
                memory_id: r.get(0)?,
                version: r.get::<_, i64>(1)? as u32,
                text: r.get(2)?,
                tier: Tier::parse_name(&tier_str).unwrap_or(Tier::Working),
                status: Status::parse_name(&status_str).unwrap_or(Status::Active),
                transition: parse_transition(&transition_str),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn transition_str(t: VersionTransition) -> &'static str {
    match t {
        VersionTransition::Promote => "promote",
        VersionTransition::Archive => "archive",
        VersionTransition::Update => "update",
    }
}

fn parse_transition(s: &str) -> VersionTransition {
    match s {
        "promote" => VersionTransition::Promote,
        "archive" => VersionTransition::Archive,
        _ => VersionTransition::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Source;

    fn store() -> SqliteStore {
        SqliteStore::open(None).unwrap()
    }

    #[tokio::test]
    async fn store_then_get_by_id_round_trips() {
        let s = store();
        let params = StoreParams::new(
            "u1",
            "Docker networking bridges containers together",
            Tier::Patterns,
            Source::SystemSeed { seed_name: "test".into() },
        );
        let item = s.store(params).await.unwrap();
        let fetched = s.get_by_id(&item.memory_id, "u1").await.unwrap().unwrap();
        assert_eq!(fetched.text, item.text);
        assert_eq!(fetched.current_version, 1);
        assert_eq!(fetched.stats.wilson_score, 0.5);
    }

    #[tokio::test]
    async fn archive_excludes_from_active_query() {
        let s = store();
        let item = s
            .store(StoreParams::new("u1", "hello", Tier::Working, Source::SystemSeed { seed_name: "t".into() }))
            .await
            .unwrap();
        s.archive(&item.memory_id, "u1", Some("superseded")).await.unwrap();

        let active = s.query(QueryFilters::new("u1")).await.unwrap();
        assert!(active.is_empty());

        let mut archived_filter = QueryFilters::new("u1");
        archived_filter.statuses = vec![Status::Archived];
        let archived = s.query(archived_filter).await.unwrap();
        assert_eq!(archived.len(), 1);
    }

    #[tokio::test]
    async fn record_outcome_increments_uses_for_every_outcome_kind() {
        let s = store();
        let item = s
            .store(StoreParams::new("u1", "hello", Tier::Working, Source::SystemSeed { seed_name: "t".into() }))
            .await
            .unwrap();

        s.record_outcome(&item.memory_id, "u1", OutcomeKind::Worked, 1.0).await.unwrap();
        s.record_outcome(&item.memory_id, "u1", OutcomeKind::Worked, 1.0).await.unwrap();
        s.record_outcome(&item.memory_id, "u1", OutcomeKind::Failed, 0.0).await.unwrap();
        let after = s.record_outcome(&item.memory_id, "u1", OutcomeKind::Partial, 0.5).await.unwrap();

        assert_eq!(after.stats.uses, 4);
        assert_eq!(after.stats.worked, 2);
        assert_eq!(after.stats.failed, 1);
        assert_eq!(after.stats.partial, 1);
        assert!((after.stats.success_count - 2.5).abs() < 1e-9);
        assert!((after.stats.wilson_score - wilson_default(2.5, 4)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn update_writes_a_version_snapshot() {
        let s = store();
        let item = s
            .store(StoreParams::new("u1", "v1 text", Tier::Working, Source::SystemSeed { seed_name: "t".into() }))
            .await
            .unwrap();
        let updated = s
            .update(
                &item.memory_id,
                "u1",
                UpdateParams { text: Some("v2 text".into()), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(updated.current_version, 2);

        let history = s.get_version_history(&item.memory_id, "u1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text, "v2 text");
    }

    #[tokio::test]
    async fn count_by_tier_is_dense_with_zeroes() {
        let s = store();
        s.store(StoreParams::new("u1", "a", Tier::Working, Source::SystemSeed { seed_name: "t".into() }))
            .await
            .unwrap();
        let counts = s.count_by_tier("u1").await.unwrap();
        assert_eq!(counts.len(), 7);
        assert_eq!(counts[&Tier::Working], 1);
        assert_eq!(counts[&Tier::Patterns], 0);
    }
}
