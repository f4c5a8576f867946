//! Database schema migrations for the document store.

/// A single forward-only schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Memory items, versions, and FTS5 index",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Outcome audit log and action outcomes",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Known solutions (pattern-tier fast path)",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Knowledge graph: nodes, edges, routing, action effectiveness",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "Document registry",
        up: MIGRATION_V5_UP,
    },
    Migration {
        version: 6,
        description: "Reindex checkpoints and consistency logs",
        up: MIGRATION_V6_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_items (
    memory_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,

    text TEXT NOT NULL,
    summary TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    entities TEXT NOT NULL DEFAULT '[]',
    language TEXT NOT NULL DEFAULT 'none',

    tier TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    always_inject INTEGER NOT NULL DEFAULT 0,

    source_kind TEXT NOT NULL,
    source_json TEXT NOT NULL,

    importance REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 0.5,
    mentioned_count INTEGER NOT NULL DEFAULT 0,
    quality_score REAL NOT NULL DEFAULT 0.0,

    uses INTEGER NOT NULL DEFAULT 0,
    worked INTEGER NOT NULL DEFAULT 0,
    partial INTEGER NOT NULL DEFAULT 0,
    unknown_outcome INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    success_count REAL NOT NULL DEFAULT 0.0,
    success_rate REAL NOT NULL DEFAULT 0.0,
    wilson_score REAL NOT NULL DEFAULT 0.5,
    last_used_at TEXT,

    current_version INTEGER NOT NULL DEFAULT 1,
    supersedes_memory_id TEXT,

    embedding_model_id TEXT,
    embedding_dimensions INTEGER,
    embedding_vector_hash TEXT,
    embedding_last_indexed_at TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    archived_at TEXT,
    expires_at TEXT,

    persona_id TEXT,
    persona_display_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_memory_items_user ON memory_items(user_id);
CREATE INDEX IF NOT EXISTS idx_memory_items_user_tier_status ON memory_items(user_id, tier, status);
CREATE INDEX IF NOT EXISTS idx_memory_items_wilson ON memory_items(wilson_score);
CREATE INDEX IF NOT EXISTS idx_memory_items_expires ON memory_items(expires_at);
CREATE INDEX IF NOT EXISTS idx_memory_items_always_inject ON memory_items(user_id, always_inject, status);

-- Weighted FTS over text/summary/tags (weights applied at query time via bm25()).
CREATE VIRTUAL TABLE IF NOT EXISTS memory_items_fts USING fts5(
    memory_id UNINDEXED,
    text,
    summary,
    tags,
    tokenize = 'porter ascii'
);

CREATE TABLE IF NOT EXISTS memory_versions (
    memory_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    text TEXT NOT NULL,
    tier TEXT NOT NULL,
    status TEXT NOT NULL,
    transition TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (memory_id, version)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    outcome TEXT NOT NULL,
    score_delta REAL NOT NULL,
    wilson_after REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_outcomes_memory ON memory_outcomes(memory_id);

CREATE TABLE IF NOT EXISTS action_outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    context_type TEXT NOT NULL,
    action TEXT NOT NULL,
    tier TEXT,
    outcome TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_action_outcomes_user ON action_outcomes(user_id, context_type);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS known_solutions (
    user_id TEXT NOT NULL,
    problem_hash TEXT NOT NULL,
    memory_id TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 1,
    first_used_at TEXT NOT NULL,
    last_used_at TEXT NOT NULL,
    PRIMARY KEY (user_id, problem_hash)
);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS kg_nodes (
    user_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    label TEXT NOT NULL,
    node_type TEXT NOT NULL,
    aliases TEXT NOT NULL DEFAULT '[]',
    mentions INTEGER NOT NULL DEFAULT 0,
    quality_sum REAL NOT NULL DEFAULT 0.0,
    memory_ids TEXT NOT NULL DEFAULT '[]',
    translations TEXT NOT NULL DEFAULT '{}',
    source_language TEXT NOT NULL DEFAULT 'none',
    PRIMARY KEY (user_id, node_id)
);
CREATE INDEX IF NOT EXISTS idx_kg_nodes_label ON kg_nodes(user_id, label);

CREATE TABLE IF NOT EXISTS kg_edges (
    user_id TEXT NOT NULL,
    edge_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (user_id, edge_id)
);
CREATE INDEX IF NOT EXISTS idx_kg_edges_source ON kg_edges(user_id, source_id);
CREATE INDEX IF NOT EXISTS idx_kg_edges_target ON kg_edges(user_id, target_id);

CREATE TABLE IF NOT EXISTS kg_routing_concepts (
    user_id TEXT NOT NULL,
    concept_id TEXT NOT NULL,
    best_tiers TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, concept_id)
);

CREATE TABLE IF NOT EXISTS kg_routing_stats (
    user_id TEXT NOT NULL,
    concept_id TEXT NOT NULL,
    tier TEXT NOT NULL,
    uses INTEGER NOT NULL DEFAULT 0,
    worked INTEGER NOT NULL DEFAULT 0,
    partial INTEGER NOT NULL DEFAULT 0,
    unknown_outcome INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 0.0,
    wilson_score REAL NOT NULL DEFAULT 0.5,
    last_used_at TEXT,
    PRIMARY KEY (user_id, concept_id, tier)
);

CREATE TABLE IF NOT EXISTS kg_action_effectiveness (
    user_id TEXT NOT NULL,
    context_type TEXT NOT NULL,
    action TEXT NOT NULL,
    tier TEXT NOT NULL DEFAULT '',
    uses INTEGER NOT NULL DEFAULT 0,
    worked INTEGER NOT NULL DEFAULT 0,
    partial INTEGER NOT NULL DEFAULT 0,
    unknown_outcome INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    success_count REAL NOT NULL DEFAULT 0.0,
    wilson_score REAL NOT NULL DEFAULT 0.5,
    examples TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, context_type, action, tier)
);

CREATE TABLE IF NOT EXISTS personality_memory_mappings (
    user_id TEXT NOT NULL,
    memory_id TEXT NOT NULL,
    persona_id TEXT NOT NULL,
    display_name TEXT,
    PRIMARY KEY (user_id, memory_id)
);

UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS document_registry (
    user_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    url_hash TEXT,
    url TEXT,
    title TEXT,
    markdown TEXT,
    char_count INTEGER NOT NULL DEFAULT 0,
    word_count INTEGER NOT NULL DEFAULT 0,
    page_count INTEGER,
    summary_en TEXT,
    summary_he TEXT,
    key_points_en TEXT NOT NULL DEFAULT '[]',
    key_points_he TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'queued',
    error TEXT,
    memory_ids TEXT NOT NULL DEFAULT '[]',
    processing_time_ms INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, content_hash)
);
CREATE INDEX IF NOT EXISTS idx_document_registry_url_hash ON document_registry(user_id, url_hash);

UPDATE schema_version SET version = 5, applied_at = datetime('now');
"#;

const MIGRATION_V6_UP: &str = r#"
CREATE TABLE IF NOT EXISTS reindex_checkpoints (
    user_id TEXT PRIMARY KEY,
    last_reindexed_at TEXT NOT NULL,
    drift_detected INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS consistency_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_consistency_logs_user ON consistency_logs(user_id, created_at);

UPDATE schema_version SET version = 6, applied_at = datetime('now');
"#;

pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(version = migration.version, description = migration.description, "applying migration");
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }
    Ok(applied)
}
