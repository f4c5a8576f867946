//! S4: interleaved outcomes keep `uses`, per-kind counters, and
//! `success_count`/`success_rate` mutually consistent, and reject
//! malformed outcome strings before they touch storage.

use memoria_core::memory::{MemoryStore, Source, Tier};
use memoria_e2e_tests::harness::TestHarness;

#[tokio::test]
async fn interleaved_outcomes_keep_counters_consistent() {
    let harness = TestHarness::new(&["rollback"]);
    let item = harness
        .seed("u1", "rollback the failed deployment", Tier::Working, Source::SystemSeed { seed_name: "seed".into() })
        .await;

    for outcome in ["worked", "failed", "partial", "worked", "unknown"] {
        harness.outcomes.record_from_str(&item.memory_id, "u1", outcome).await.unwrap();
    }

    let updated = harness.store.get_by_id(&item.memory_id, "u1").await.unwrap().unwrap();
    assert_eq!(updated.stats.uses, 5);
    assert_eq!(updated.stats.worked, 2);
    assert_eq!(updated.stats.failed, 1);
    assert_eq!(updated.stats.partial, 1);
    assert_eq!(updated.stats.unknown, 1);
    assert!(updated.stats.counts_are_consistent());

    let expected_success_count = 2.0 * 1.0 + 1.0 * 0.0 + 1.0 * 0.5 + 1.0 * 0.25; // worked + failed + partial + unknown
    assert!((updated.stats.success_count - expected_success_count).abs() < 1e-9);
    assert!((updated.stats.success_rate - expected_success_count / 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn malformed_outcome_string_is_rejected_before_storage() {
    let harness = TestHarness::new(&["noop"]);
    let item = harness.seed("u1", "noop memory", Tier::Working, Source::SystemSeed { seed_name: "seed".into() }).await;

    let err = harness.outcomes.record_from_str(&item.memory_id, "u1", "sort-of-worked").await.unwrap_err();
    assert!(matches!(err, memoria_core::error::OutcomeError::InvalidOutcome(_)));

    let unchanged = harness.store.get_by_id(&item.memory_id, "u1").await.unwrap().unwrap();
    assert_eq!(unchanged.stats.uses, 0);
}
