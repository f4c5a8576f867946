//! Circuit breaker
//!
//! Independent per-dependency state machine guarding the lexical adapter,
//! vector index adapter, and reranker client. Stops calls to a dependency
//! after repeated failures and probes for recovery after a cool-down.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerSettings;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - calls pass through.
    Closed,
    /// Failure threshold reached - calls short-circuit to empty results.
    Open,
    /// Probing whether the dependency has recovered.
    HalfOpen,
}

/// Circuit breaker for a single external dependency.
///
/// Lock-free: all mutable state is atomic, so `can_execute`/`record_success`/
/// `record_failure` never hold a lock across the caller's network call.
pub struct CircuitBreaker {
    name: String,
    settings: CircuitBreakerSettings,
    state: std::sync::RwLock<CircuitState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    opened_at_millis: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            state: std::sync::RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Current state, resolving a pending `Open -> HalfOpen` transition if
    /// the cool-down has elapsed.
    pub fn state(&self) -> CircuitState {
        let current = *self.state.read().unwrap();
        if current != CircuitState::Open {
            return current;
        }

        let opened_at = self.opened_at_millis.load(Ordering::Acquire);
        let elapsed = Duration::from_millis(self.now_millis().saturating_sub(opened_at));
        if elapsed >= self.settings.open_duration() {
            let mut guard = self.state.write().unwrap();
            if *guard == CircuitState::Open {
                *guard = CircuitState::HalfOpen;
                self.success_count.store(0, Ordering::Release);
                tracing::info!(breaker = %self.name, "circuit breaker half-open, probing");
            }
            *guard
        } else {
            CircuitState::Open
        }
    }

    /// Whether a call should be attempted right now.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.settings.success_threshold {
                    *self.state.write().unwrap() = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::Release);
                    tracing::info!(breaker = %self.name, "circuit breaker closed, dependency recovered");
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.settings.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "probe failed, circuit breaker re-opened");
                self.trip();
            }
            CircuitState::Open => {
                self.opened_at_millis.store(self.now_millis(), Ordering::Release);
            }
        }
    }

    fn trip(&self) {
        *self.state.write().unwrap() = CircuitState::Open;
        self.opened_at_millis.store(self.now_millis(), Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs `f` through the breaker: skipped entirely if open, otherwise the
/// result is used to record success/failure. Callers interpret
/// `Ok(None)` (breaker open) as "skip this stage, note the fallback".
pub async fn guarded<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    f: F,
) -> Option<Result<T, E>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    if breaker.is_open() {
        return None;
    }

    let result = f().await;
    match &result {
        Ok(_) => breaker.record_success(),
        Err(_) => breaker.record_failure(),
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_threshold: 3,
            success_threshold: 2,
            open_duration_ms: 50,
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("bm25", settings());
        assert_eq!(cb.state(), CircuitState::Closed);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_open());
    }

    #[test]
    fn half_opens_after_cooldown_and_closes_on_success_threshold() {
        let cb = CircuitBreaker::new("bm25", settings());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.is_open());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("bm25", settings());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn guarded_skips_when_open() {
        let cb = CircuitBreaker::new("bm25", settings());
        for _ in 0..3 {
            cb.record_failure();
        }
        let result: Option<Result<u32, String>> =
            guarded(&cb, || async { Ok::<u32, String>(1) }).await;
        assert!(result.is_none());
    }
}
