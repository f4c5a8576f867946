//! # Memoria Core
//!
//! The memory retrieval and learning core for a local-first assistant:
//! hybrid dense/lexical search with rank fusion and optional cross-encoder
//! reranking, Wilson-score outcome tracking, three coordinated knowledge
//! graphs (routing, content, action), a document registry with dedup and
//! background ingestion, and a pattern-tier fast path for recognised
//! problems.
//!
//! ## Layout
//!
//! - [`memory`]: the memory item data model and the [`memory::MemoryStore`]
//!   contract.
//! - [`wilson`]: the Wilson score lower bound, the sole effectiveness
//!   signal used across memory items, routing concepts, and action
//!   effectiveness.
//! - [`store`]: the `rusqlite` + FTS5 implementation of `MemoryStore`,
//!   migrations, and every supporting table.
//! - [`embedder`]: the external embedding model interface.
//! - [`vector`]: the vector index adapter trait plus an in-memory and a
//!   USearch-backed implementation (`vector-search` feature).
//! - [`lexical`]: the BM25/FTS5 search adapter.
//! - [`reranker`]: the HTTP cross-encoder client.
//! - [`circuit`]: the circuit breaker guarding the above three adapters.
//! - [`search`]: the hybrid search service that fuses and ranks across all
//!   of the above.
//! - [`outcome`]: validates and records outcomes against stored items.
//! - [`kg`]: the routing, content, and action knowledge graphs.
//! - [`registry`]: document ingestion, dedup, and chunking.
//! - [`known_solutions`]: the pattern-tier fast path.
//! - [`config`]: the aggregate configuration for every module above.
//! - [`error`]: the shared error taxonomy.
//!
//! ## Feature flags
//!
//! - `vector-search` (default): enables the USearch HNSW-backed vector
//!   index, in addition to the always-available in-memory one.
//! - `bundled-sqlite` (default): statically links SQLite via
//!   `rusqlite/bundled`.
//! - `encryption`: switches to `rusqlite/bundled-sqlcipher` for an
//!   encrypted document store.
//! - `full`: everything above.

pub mod circuit;
pub mod config;
pub mod embedder;
pub mod error;
pub mod kg;
pub mod known_solutions;
pub mod lexical;
pub mod memory;
pub mod outcome;
pub mod registry;
pub mod reranker;
pub mod search;
pub mod store;
pub mod vector;
pub mod wilson;

pub use circuit::{guarded, CircuitBreaker, CircuitState};
pub use config::Config;
pub use embedder::{cosine_similarity, l2_normalize, Embedder, EmbedderError};
pub use error::{ErrorKind, OutcomeError, RegistryError, SearchStageError, StorageError, StorageResult};
pub use known_solutions::{KnownSolutions, KNOWN_SOLUTION_SCORE};
pub use lexical::{LexicalAdapter, LexicalSearchParams};
pub use memory::{
    EmbeddingMeta, Language, LexicalHit, MemoryItem, MemoryStats, MemoryStore, MemoryVersion,
    OutcomeKind, PersonalityAttribution, QueryFilters, SortField, Source, Status, StoreParams,
    TextSearchOptions, Tier, UpdateParams, VersionTransition,
};
pub use outcome::OutcomePipeline;
pub use registry::{DocumentEntry, DocumentPayload, DocumentRegistry, DocumentStatus, DocumentSummary, DocumentParser, Summarizer};
pub use reranker::{RerankHit, RerankerClient};
pub use search::{
    Citation, Confidence, HybridSearchService, ScoreSummary, SearchDebug, SearchParams,
    SearchResponse, SearchResult,
};
pub use store::{Migration, SqliteStore, MIGRATIONS};
pub use vector::{
    InMemoryVectorIndex, VectorHit, VectorIndexAdapter, VectorIndexError, VectorPayload,
    VectorPoint, VectorSearchParams,
};
pub use wilson::{wilson, wilson_default, DEFAULT_Z, UNINFORMED_PRIOR};

#[cfg(feature = "vector-search")]
pub use vector::UsearchVectorIndex;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience imports for common usage.
pub mod prelude {
    pub use crate::{
        CircuitBreaker, Config, Embedder, HybridSearchService, KnownSolutions, MemoryItem,
        MemoryStore, OutcomeKind, OutcomePipeline, SearchParams, SearchResponse, SearchResult,
        Source, Status, StoreParams, Tier,
    };

    #[cfg(feature = "vector-search")]
    pub use crate::UsearchVectorIndex;
}
