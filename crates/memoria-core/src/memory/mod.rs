//! Memory module - data model and the `MemoryStore` contract.
//!
//! Implements the memory item described by the data model: identity,
//! content, placement, source provenance, quality signals, outcome stats,
//! versioning, embedding metadata, and timestamps.

mod item;
mod store_trait;

pub use item::{
    EmbeddingMeta, Language, MemoryItem, MemoryStats, MemoryVersion, OutcomeKind,
    PersonalityAttribution, Source, Status, Tier, VersionTransition,
};
pub use store_trait::{
    LexicalHit, MemoryStore, QueryFilters, SortField, StoreParams, TextSearchOptions, UpdateParams,
};
