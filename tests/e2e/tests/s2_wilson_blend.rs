//! S2: a `memory_bank` item's Wilson score only blends into its final
//! rank once it has accumulated at least three uses.

use memoria_core::memory::{MemoryStore, OutcomeKind, Source, Tier};
use memoria_core::search::SearchParams;
use memoria_e2e_tests::harness::TestHarness;

#[tokio::test]
async fn wilson_blend_kicks_in_at_three_uses_not_before() {
    let harness = TestHarness::new(&["compose", "restart", "containers"]);
    let item = harness
        .seed(
            "u1",
            "compose restarts unhealthy containers automatically",
            Tier::MemoryBank,
            Source::SystemSeed { seed_name: "seed".into() },
        )
        .await;

    for _ in 0..2 {
        harness.outcomes.record(&item.memory_id, "u1", OutcomeKind::Worked).await.unwrap();
    }
    let response = harness.search.search(SearchParams::new("u1", "compose restart containers")).await;
    let before = response.results[0].score.final_score;
    let wilson_before = response.results[0].score.wilson_score.unwrap();

    harness.outcomes.record(&item.memory_id, "u1", OutcomeKind::Worked).await.unwrap();
    let response = harness.search.search(SearchParams::new("u1", "compose restart containers")).await;
    let after = response.results[0].score.final_score;
    let wilson_after = response.results[0].score.wilson_score.unwrap();

    assert!(wilson_after > wilson_before);
    // At exactly 3 uses the Wilson score now contributes to final_score,
    // which a pure RRF score at 2 uses never reflected.
    assert_ne!(before, after);
}

#[tokio::test]
async fn failed_outcomes_still_count_toward_uses_but_lower_wilson() {
    let harness = TestHarness::new(&["migration", "schema"]);
    let item = harness
        .seed(
            "u1",
            "run the schema migration before restarting",
            Tier::MemoryBank,
            Source::SystemSeed { seed_name: "seed".into() },
        )
        .await;

    for _ in 0..3 {
        harness.outcomes.record(&item.memory_id, "u1", OutcomeKind::Failed).await.unwrap();
    }

    let updated = harness.store.get_by_id(&item.memory_id, "u1").await.unwrap().unwrap();
    assert_eq!(updated.stats.uses, 3);
    assert_eq!(updated.stats.failed, 3);
    assert!(updated.stats.wilson_score < 0.5);
}
