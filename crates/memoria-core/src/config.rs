//! Aggregate configuration for the retrieval/learning core.
//!
//! Mirrors the teacher's per-module `*Config` structs (`VectorIndexConfig`,
//! `HybridSearchConfig`, `RerankerConfig`) by giving every named knob a
//! field with a sensible default, rather than reading the environment
//! itself. The host application owns configuration sourcing.

use std::time::Duration;

/// Per-operation and end-to-end timeouts.
#[derive(Debug, Clone)]
pub struct TimeoutsConfig {
    /// Total search deadline (spec default: 15s).
    pub end_to_end_search_ms: u64,
    /// Cap on a single document-store text query.
    pub store_text_query_ms: u64,
    /// Cap on a single document-store aggregate/update query.
    pub store_aggregate_ms: u64,
    /// Reranker HTTP call abort.
    pub reranker_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            end_to_end_search_ms: 15_000,
            store_text_query_ms: 2_000,
            store_aggregate_ms: 2_000,
            reranker_ms: 2_500,
        }
    }
}

impl TimeoutsConfig {
    pub fn end_to_end_search(&self) -> Duration {
        Duration::from_millis(self.end_to_end_search_ms)
    }
    pub fn store_text_query(&self) -> Duration {
        Duration::from_millis(self.store_text_query_ms)
    }
    pub fn store_aggregate(&self) -> Duration {
        Duration::from_millis(self.store_aggregate_ms)
    }
    pub fn reranker(&self) -> Duration {
        Duration::from_millis(self.reranker_ms)
    }
}

/// Result-set caps and candidate fetch multipliers.
#[derive(Debug, Clone)]
pub struct CapsConfig {
    pub search_limit_default: usize,
    pub search_limit_max: usize,
    pub candidate_fetch_multiplier_per_tier: usize,
    pub rerank_k: usize,
    pub rerank_max_input_chars: usize,
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            search_limit_default: 10,
            search_limit_max: 100,
            candidate_fetch_multiplier_per_tier: 3,
            rerank_k: 50,
            rerank_max_input_chars: 2_000,
        }
    }
}

/// RRF modality weights (dense vs. text).
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingBlendConfig {
    pub dense_weight: f32,
    pub text_weight: f32,
}

impl Default for EmbeddingBlendConfig {
    fn default() -> Self {
        Self {
            dense_weight: 1.0,
            text_weight: 1.0,
        }
    }
}

/// Cross-encoder rerank blend weights.
#[derive(Debug, Clone, Copy)]
pub struct CrossEncoderBlendConfig {
    pub original_weight: f32,
    pub ce_weight: f32,
}

impl Default for CrossEncoderBlendConfig {
    fn default() -> Self {
        Self {
            original_weight: 0.5,
            ce_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeightsConfig {
    pub embedding_blend: EmbeddingBlendConfig,
    pub cross_encoder_blend: CrossEncoderBlendConfig,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            embedding_blend: EmbeddingBlendConfig::default(),
            cross_encoder_blend: CrossEncoderBlendConfig::default(),
        }
    }
}

/// Circuit breaker tuning for one dependency.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration_ms: u64,
}

impl CircuitBreakerSettings {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakersConfig {
    pub bm25: CircuitBreakerSettings,
    pub reranker: CircuitBreakerSettings,
    pub qdrant: CircuitBreakerSettings,
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        Self {
            bm25: CircuitBreakerSettings::default(),
            reranker: CircuitBreakerSettings::default(),
            qdrant: CircuitBreakerSettings::default(),
        }
    }
}

/// Score deltas recorded alongside an outcome for audit purposes. Distinct
/// from the fixed success weights used to compute `success_count`.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeDeltasConfig {
    pub worked: f64,
    pub partial: f64,
    pub unknown: f64,
    pub failed: f64,
}

impl Default for OutcomeDeltasConfig {
    fn default() -> Self {
        Self {
            worked: 1.0,
            partial: 0.25,
            unknown: 0.0,
            failed: -0.5,
        }
    }
}

/// Tier boost multipliers applied exactly once per (modality, candidate)
/// during RRF fusion.
#[derive(Debug, Clone)]
pub struct TierBoosts {
    pub documents: f32,
    pub memory_bank: f32,
    pub patterns: f32,
    pub history: f32,
    pub working: f32,
    pub datagov_schema: f32,
    pub datagov_expansion: f32,
}

impl Default for TierBoosts {
    fn default() -> Self {
        Self {
            documents: 1.5,
            memory_bank: 1.3,
            patterns: 1.2,
            history: 1.0,
            working: 0.7,
            datagov_schema: 1.1,
            datagov_expansion: 1.0,
        }
    }
}

/// Root configuration aggregating every knob named in the spec.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub timeouts: TimeoutsConfig,
    pub caps: CapsConfig,
    pub weights: WeightsConfig,
    pub circuit_breakers: CircuitBreakersConfig,
    pub outcome_deltas: OutcomeDeltasConfig,
    pub tier_boosts: TierBoosts,
}
