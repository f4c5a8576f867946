//! S6: a pinned known solution bypasses the hybrid pipeline entirely and
//! is handed back as a synthetic top-ranked result, but only while it
//! still points at an active `patterns`-tier item.

use memoria_core::known_solutions::KNOWN_SOLUTION_SCORE;
use memoria_core::memory::{MemoryStore, Source, Tier, UpdateParams};
use memoria_e2e_tests::harness::TestHarness;

#[tokio::test]
async fn pinned_pattern_short_circuits_with_a_synthetic_top_score() {
    let harness = TestHarness::new(&["disk", "cleanup"]);
    let item = harness
        .seed(
            "u1",
            "run the disk cleanup script to reclaim space",
            Tier::Patterns,
            Source::SystemSeed { seed_name: "seed".into() },
        )
        .await;

    assert!(harness.known_solutions.get_known_solution("u1", "disk-full-hash").await.unwrap().is_none());

    harness.known_solutions.record_known_solution("u1", "disk-full-hash", &item.memory_id).unwrap();
    let hit = harness.known_solutions.get_known_solution("u1", "disk-full-hash").await.unwrap().unwrap();
    assert_eq!(hit.memory_id, item.memory_id);
    assert_eq!(hit.score.final_score, KNOWN_SOLUTION_SCORE);
}

#[tokio::test]
async fn pin_stops_resolving_once_the_item_leaves_the_patterns_tier() {
    let harness = TestHarness::new(&["memory", "leak"]);
    let item = harness
        .seed("u1", "restart the service to clear a memory leak", Tier::Patterns, Source::SystemSeed { seed_name: "seed".into() })
        .await;
    harness.known_solutions.record_known_solution("u1", "leak-hash", &item.memory_id).unwrap();

    harness
        .store
        .update(&item.memory_id, "u1", UpdateParams { tier: Some(Tier::Working), ..Default::default() })
        .await
        .unwrap();

    assert!(harness.known_solutions.get_known_solution("u1", "leak-hash").await.unwrap().is_none());
}
