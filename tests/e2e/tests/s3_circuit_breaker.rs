//! S3: the lexical adapter's circuit breaker opens after repeated store
//! failures, short-circuits to empty results while open, and closes again
//! once the dependency recovers.

use std::sync::Arc;
use std::time::Duration;

use memoria_core::circuit::CircuitState;
use memoria_core::config::CircuitBreakerSettings;
use memoria_core::lexical::{LexicalAdapter, LexicalSearchParams};
use memoria_core::memory::{MemoryStore, Source, StoreParams, Tier};
use memoria_core::store::SqliteStore;
use memoria_e2e_tests::harness::FlakyStore;

fn settings() -> CircuitBreakerSettings {
    CircuitBreakerSettings { failure_threshold: 3, success_threshold: 2, open_duration_ms: 50 }
}

#[tokio::test]
async fn opens_on_repeated_failures_and_recovers_after_cooldown() {
    let inner = Arc::new(SqliteStore::open(None).unwrap());
    inner
        .store(StoreParams::new(
            "u1",
            "docker bridge networking",
            Tier::Patterns,
            Source::SystemSeed { seed_name: "seed".into() },
        ))
        .await
        .unwrap();

    let flaky = Arc::new(FlakyStore::new(inner));
    let adapter = LexicalAdapter::new(flaky.clone(), memoria_core::circuit::CircuitBreaker::new("bm25", settings()));

    flaky.set_failing(true);
    for _ in 0..3 {
        let hits = adapter
            .search(LexicalSearchParams { user_id: "u1".into(), query: "docker".into(), tiers: None, limit: 10, timeout_ms: 2000 })
            .await;
        assert!(hits.is_empty());
    }
    assert_eq!(adapter.breaker().state(), CircuitState::Open);

    // While open, the store is never even consulted.
    let hits = adapter
        .search(LexicalSearchParams { user_id: "u1".into(), query: "docker".into(), tiers: None, limit: 10, timeout_ms: 2000 })
        .await;
    assert!(hits.is_empty());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(adapter.breaker().state(), CircuitState::HalfOpen);

    flaky.set_failing(false);
    for _ in 0..2 {
        let hits = adapter
            .search(LexicalSearchParams { user_id: "u1".into(), query: "docker bridge".into(), tiers: None, limit: 10, timeout_ms: 2000 })
            .await;
        assert_eq!(hits.len(), 1);
    }
    assert_eq!(adapter.breaker().state(), CircuitState::Closed);
}
