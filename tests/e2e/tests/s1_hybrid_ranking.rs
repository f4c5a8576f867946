//! S1: dense and lexical hits fuse into a single ranked result, tier boost
//! is applied, and raw working-tier conversation snippets never surface.

use memoria_core::memory::{Source, Tier};
use memoria_core::search::SearchParams;
use memoria_e2e_tests::harness::TestHarness;

#[tokio::test]
async fn ranks_a_pattern_above_a_lower_boosted_tier_on_the_same_query() {
    let harness = TestHarness::new(&["docker", "bridge", "networking"]);

    let pattern = harness
        .seed(
            "u1",
            "Docker networking uses a bridge by default",
            Tier::Patterns,
            Source::SystemSeed { seed_name: "seed".into() },
        )
        .await;
    harness
        .seed(
            "u1",
            "Docker networking bridge notes from a working session",
            Tier::Working,
            Source::Conversation { conversation_id: "c1".into(), message_id: "m1".into() },
        )
        .await;

    let response = harness.search.search(SearchParams::new("u1", "docker bridge networking")).await;

    assert!(response.debug.errors.is_empty());
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].memory_id, pattern.memory_id);
}

#[tokio::test]
async fn working_tier_conversation_snippets_never_surface() {
    let harness = TestHarness::new(&["restart", "docker"]);
    harness
        .seed(
            "u1",
            "User: how do I restart docker",
            Tier::Working,
            Source::Conversation { conversation_id: "c1".into(), message_id: "m1".into() },
        )
        .await;

    let response = harness.search.search(SearchParams::new("u1", "restart docker")).await;
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn min_score_filters_out_weak_matches() {
    let harness = TestHarness::new(&["kubernetes", "pods"]);
    harness
        .seed(
            "u1",
            "Kubernetes pods share a network namespace",
            Tier::Patterns,
            Source::SystemSeed { seed_name: "seed".into() },
        )
        .await;

    let mut params = SearchParams::new("u1", "kubernetes pods");
    params.min_score = Some(1000.0);
    let response = harness.search.search(params).await;
    assert!(response.results.is_empty());
}
