//! The memory item - the fundamental unit of retrievable knowledge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

/// Placement class controlling retention policy and search boost.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Working,
    History,
    Patterns,
    /// Normalised synonym of `Documents` at ingest time (open question #1).
    Books,
    MemoryBank,
    DatagovSchema,
    DatagovExpansion,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Working => "working",
            Tier::History => "history",
            Tier::Patterns => "patterns",
            Tier::Books => "books",
            Tier::MemoryBank => "memory_bank",
            Tier::DatagovSchema => "datagov_schema",
            Tier::DatagovExpansion => "datagov_expansion",
        }
    }

    /// Parse a tier name, normalising the `documents`/`books` synonym pair
    /// to `Books` as decided in the Open Questions.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "working" => Some(Tier::Working),
            "history" => Some(Tier::History),
            "patterns" => Some(Tier::Patterns),
            "books" | "documents" => Some(Tier::Books),
            "memory_bank" => Some(Tier::MemoryBank),
            "datagov_schema" => Some(Tier::DatagovSchema),
            "datagov_expansion" => Some(Tier::DatagovExpansion),
            _ => None,
        }
    }

    pub fn all() -> [Tier; 7] {
        [
            Tier::Working,
            Tier::History,
            Tier::Patterns,
            Tier::Books,
            Tier::MemoryBank,
            Tier::DatagovSchema,
            Tier::DatagovExpansion,
        ]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Active,
    Archived,
    Deleted,
    /// Soft-hidden from retrieval without archival, typically user-driven.
    Ghosted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Archived => "archived",
            Status::Deleted => "deleted",
            Status::Ghosted => "ghosted",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Status::Active),
            "archived" => Some(Status::Archived),
            "deleted" => Some(Status::Deleted),
            "ghosted" => Some(Status::Ghosted),
            _ => None,
        }
    }

    /// A memory with this status is never returned from search.
    pub fn is_searchable(&self) -> bool {
        matches!(self, Status::Active)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detected content language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    He,
    En,
    Mixed,
    #[default]
    None,
}

/// The closed set of outcome kinds, with their fixed success weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Worked,
    Partial,
    Unknown,
    Failed,
}

impl OutcomeKind {
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "worked" => Some(OutcomeKind::Worked),
            "partial" => Some(OutcomeKind::Partial),
            "unknown" => Some(OutcomeKind::Unknown),
            "failed" => Some(OutcomeKind::Failed),
            _ => None,
        }
    }

    /// Fixed success weight used to accumulate `success_count` (spec §4.2).
    pub fn success_weight(&self) -> f64 {
        match self {
            OutcomeKind::Worked => 1.0,
            OutcomeKind::Partial => 0.5,
            OutcomeKind::Unknown => 0.25,
            OutcomeKind::Failed => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Worked => "worked",
            OutcomeKind::Partial => "partial",
            OutcomeKind::Unknown => "unknown",
            OutcomeKind::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SOURCE (discriminated union)
// ============================================================================

/// Where a memory came from. An exhaustive match over this, not optional
/// chaining over a loosely-typed document, is required at every call site
/// that branches on provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Conversation {
        conversation_id: String,
        message_id: String,
    },
    Tool {
        tool_name: String,
        conversation_id: Option<String>,
    },
    Document {
        doc_id: String,
        chunk_id: Option<String>,
        /// Populated when the document originated from a book import.
        book_title: Option<String>,
        book_author: Option<String>,
        originating_url: Option<String>,
    },
    SystemSeed {
        seed_name: String,
    },
}

impl Source {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Source::Conversation { .. } => "conversation",
            Source::Tool { .. } => "tool",
            Source::Document { .. } => "document",
            Source::SystemSeed { .. } => "system_seed",
        }
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Per-outcome counters and the cumulative Wilson-scored effectiveness of a
/// memory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub uses: u32,
    pub worked: u32,
    pub partial: u32,
    pub unknown: u32,
    pub failed: u32,
    /// `Σ outcome_count × outcome_success_weight`; real-valued, `<= uses`.
    pub success_count: f64,
    pub success_rate: f64,
    pub wilson_score: f64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Default for MemoryStats {
    fn default() -> Self {
        Self {
            uses: 0,
            worked: 0,
            partial: 0,
            unknown: 0,
            failed: 0,
            success_count: 0.0,
            success_rate: 0.0,
            wilson_score: crate::wilson::UNINFORMED_PRIOR,
            last_used_at: None,
        }
    }
}

impl MemoryStats {
    /// Invariant check used by tests and debug assertions:
    /// `uses == worked + partial + unknown + failed`.
    pub fn counts_are_consistent(&self) -> bool {
        self.uses == self.worked + self.partial + self.unknown + self.failed
    }
}

/// Embedding indexing bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbeddingMeta {
    pub model_id: Option<String>,
    pub dimensions: Option<usize>,
    pub vector_hash: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// Originating persona, stored for display only - never used for filtering
/// (Open Question #2).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersonalityAttribution {
    pub persona_id: Option<String>,
    pub display_name: Option<String>,
}

// ============================================================================
// MEMORY ITEM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub memory_id: String,
    pub user_id: String,

    pub text: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub entities: Vec<String>,
    pub language: Language,

    pub tier: Tier,
    pub status: Status,
    pub always_inject: bool,

    pub source: Source,

    pub importance: f64,
    pub confidence: f64,
    pub mentioned_count: u32,
    pub quality_score: f64,

    pub stats: MemoryStats,

    pub current_version: u32,
    pub supersedes_memory_id: Option<String>,

    pub embedding: EmbeddingMeta,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,

    pub personality: PersonalityAttribution,
}

impl MemoryItem {
    /// Whether the item should be treated as archived for search purposes -
    /// either explicitly archived/deleted/ghosted, or past its expiry.
    pub fn is_effectively_inactive(&self, now: DateTime<Utc>) -> bool {
        if !self.status.is_searchable() {
            return true;
        }
        matches!(self.expires_at, Some(exp) if exp < now)
    }
}

/// A single version snapshot of a memory item, written whenever `update`
/// changes its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVersion {
    pub memory_id: String,
    pub version: u32,
    pub text: String,
    pub tier: Tier,
    pub status: Status,
    pub transition: VersionTransition,
    pub created_at: DateTime<Utc>,
}

/// How an `update` call is classified for the version snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionTransition {
    Promote,
    Archive,
    Update,
}
