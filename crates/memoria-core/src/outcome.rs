//! Outcome Pipeline (spec.md §4.2): validates the outcome kind, delegates
//! the atomic counter/Wilson update to the document store, and is the single
//! place callers go through to record an outcome (as opposed to calling
//! `MemoryStore::record_outcome` directly, which skips validation).

use std::sync::Arc;

use crate::config::OutcomeDeltasConfig;
use crate::error::OutcomeError;
use crate::memory::{MemoryItem, MemoryStore, OutcomeKind};

/// Score delta recorded on the audit trail alongside the Wilson recompute.
/// Distinct from the fixed success weight used for `success_count`.
fn score_delta(outcome: OutcomeKind, deltas: &OutcomeDeltasConfig) -> f64 {
    match outcome {
        OutcomeKind::Worked => deltas.worked,
        OutcomeKind::Partial => deltas.partial,
        OutcomeKind::Unknown => deltas.unknown,
        OutcomeKind::Failed => deltas.failed,
    }
}

pub struct OutcomePipeline<S: MemoryStore> {
    store: Arc<S>,
    deltas: OutcomeDeltasConfig,
}

impl<S: MemoryStore> OutcomePipeline<S> {
    pub fn new(store: Arc<S>, deltas: OutcomeDeltasConfig) -> Self {
        Self { store, deltas }
    }

    /// Records an outcome for `memory_id`. The outcome kind is already a
    /// closed Rust enum by the time it reaches here, so validation is a
    /// type-level guarantee rather than a runtime check; an
    /// `OutcomeError::InvalidOutcome` only surfaces if a caller constructs
    /// one from an untrusted string upstream and rejects it before this
    /// point, which is why the variant exists on this error type rather
    /// than on `StorageError`.
    pub async fn record(
        &self,
        memory_id: &str,
        user_id: &str,
        outcome: OutcomeKind,
    ) -> Result<MemoryItem, OutcomeError> {
        let audit_delta = score_delta(outcome, &self.deltas);
        tracing::debug!(memory_id, ?outcome, audit_delta, "recording outcome");
        let item = self
            .store
            .record_outcome(memory_id, user_id, outcome, outcome.success_weight())
            .await?;
        Ok(item)
    }

    /// Parses an outcome kind from an untrusted string (e.g. an API request
    /// body), rejecting anything outside the closed set rather than
    /// silently discarding it.
    pub fn parse_outcome(raw: &str) -> Result<OutcomeKind, OutcomeError> {
        match raw {
            "worked" => Ok(OutcomeKind::Worked),
            "partial" => Ok(OutcomeKind::Partial),
            "unknown" => Ok(OutcomeKind::Unknown),
            "failed" => Ok(OutcomeKind::Failed),
            other => Err(OutcomeError::InvalidOutcome(other.to_string())),
        }
    }

    pub async fn record_from_str(
        &self,
        memory_id: &str,
        user_id: &str,
        raw_outcome: &str,
    ) -> Result<MemoryItem, OutcomeError> {
        let outcome = Self::parse_outcome(raw_outcome)?;
        self.record(memory_id, user_id, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Source, StoreParams, Tier};
    use crate::store::SqliteStore;

    fn pipeline() -> OutcomePipeline<SqliteStore> {
        let store = Arc::new(SqliteStore::open(None).unwrap());
        OutcomePipeline::new(store, OutcomeDeltasConfig::default())
    }

    #[tokio::test]
    async fn rejects_unknown_outcome_strings() {
        let p = pipeline();
        let err = OutcomePipeline::<SqliteStore>::parse_outcome("mostly-worked").unwrap_err();
        assert!(matches!(err, OutcomeError::InvalidOutcome(_)));
        drop(p);
    }

    #[tokio::test]
    async fn records_a_valid_outcome_against_a_stored_item() {
        let p = pipeline();
        let item = p
            .store
            .store(StoreParams::new(
                "u1",
                "remember this",
                Tier::Working,
                Source::SystemSeed { seed_name: "test".to_string() },
            ))
            .await
            .unwrap();

        let updated = p
            .record_from_str(&item.memory_id, "u1", "worked")
            .await
            .unwrap();
        assert_eq!(updated.stats.uses, 1);
        assert_eq!(updated.stats.worked, 1);
        assert!((updated.stats.success_count - 1.0).abs() < 1e-9);
    }
}
