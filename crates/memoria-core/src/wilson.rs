//! Wilson score lower bound
//!
//! Pure function computing the lower bound of the Wilson confidence
//! interval for `p = success_sum / uses`. This is the sole ranking signal
//! for "trustworthiness given limited evidence" and must be used uniformly
//! everywhere an effectiveness score appears (memory items, routing
//! concepts, action effectiveness).

/// Standard z-score for a 95% confidence interval.
pub const DEFAULT_Z: f64 = 1.96;

/// Uninformed prior returned when `uses == 0`.
pub const UNINFORMED_PRIOR: f64 = 0.5;

/// Compute the Wilson score lower bound for `success_sum` successes out of
/// `uses` trials, clamped to `[0, 1]`.
///
/// Returns [`UNINFORMED_PRIOR`] when `uses == 0` rather than dividing by
/// zero — a memory with no observations is neither trusted nor distrusted.
pub fn wilson(success_sum: f64, uses: u32, z: f64) -> f64 {
    if uses == 0 {
        return UNINFORMED_PRIOR;
    }

    let n = uses as f64;
    let p = (success_sum / n).clamp(0.0, 1.0);
    let z2 = z * z;

    let denominator = 1.0 + z2 / n;
    let centre = p + z2 / (2.0 * n);
    let margin = z * ((p * (1.0 - p) / n) + (z2 / (4.0 * n * n))).sqrt();

    let lower_bound = (centre - margin) / denominator;
    lower_bound.clamp(0.0, 1.0)
}

/// Convenience wrapper using [`DEFAULT_Z`].
pub fn wilson_default(success_sum: f64, uses: u32) -> f64 {
    wilson(success_sum, uses, DEFAULT_Z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_uses_returns_uninformed_prior() {
        assert_eq!(wilson_default(0.0, 0), UNINFORMED_PRIOR);
    }

    #[test]
    fn bounded_in_unit_interval() {
        for uses in [1u32, 2, 5, 10, 100, 10_000] {
            for successes in 0..=uses {
                let score = wilson_default(successes as f64, uses);
                assert!((0.0..=1.0).contains(&score), "score {score} out of bounds");
            }
        }
    }

    #[test]
    fn more_evidence_at_same_rate_increases_lower_bound() {
        let few = wilson_default(9.0, 10);
        let many = wilson_default(900.0, 1000);
        assert!(many > few, "many={many} few={few}");
    }

    #[test]
    fn perfect_rate_with_little_evidence_is_penalised() {
        let one_use = wilson_default(1.0, 1);
        let ten_uses = wilson_default(10.0, 10);
        assert!(ten_uses > one_use);
        assert!(one_use < 1.0, "a single success should not reach perfect confidence");
    }

    #[test]
    fn matches_known_reference_value() {
        // p = 0.8, n = 10, z = 1.96 -> lower bound ~= 0.4907
        let score = wilson(8.0, 10, DEFAULT_Z);
        assert!((score - 0.4907).abs() < 0.001, "got {score}");
    }

    #[test]
    fn failed_only_history_is_zero() {
        assert_eq!(wilson_default(0.0, 5), 0.0);
    }
}
