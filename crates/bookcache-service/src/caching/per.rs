//! Probabilistic early recomputation, also known as "XFetch".
//!
//! Instead of having every reader miss at the moment an entry expires, each reader rolls a die
//! and recomputes a little early with a probability that grows as the remaining lifetime shrinks
//! relative to how long the last computation took:
//!
//! ```text
//! recompute = remaining <= cost * beta * -ln(u),  u ~ (0, 1]
//! ```
//!
//! Expensive entries thus get refreshed earlier than cheap ones, spreading the recomputation
//! load instead of having all callers stampede the origin at the hard expiry.
use rand::Rng;
use rand::distr::OpenClosed01;

use super::CacheRecord;

/// Decides whether a read should trigger a recomputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerDecision {
    beta: f64,
}

impl PerDecision {
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Decides using a thread-local generator.
    pub fn should_recompute(&self, record: &CacheRecord) -> bool {
        self.should_recompute_with(record, &mut rand::rng())
    }

    /// Decides using the given random number generator.
    ///
    /// A miss, or a hit with any of its metadata missing, always recomputes without consuming
    /// randomness.
    pub fn should_recompute_with<R: Rng>(&self, record: &CacheRecord, rng: &mut R) -> bool {
        let (true, Some(_), Some(cost), Some(remaining)) = (
            record.hit,
            &record.value,
            record.computation_cost,
            record.remaining_freshness,
        ) else {
            return true;
        };

        let u: f64 = rng.sample(OpenClosed01);
        let threshold = recompute_threshold(cost.as_secs_f64() * 1000.0, self.beta, u);
        remaining.as_secs_f64() * 1000.0 <= threshold
    }
}

impl Default for PerDecision {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// The freshness, in milliseconds, below which an entry gets recomputed for the draw `u`.
fn recompute_threshold(cost_ms: f64, beta: f64, u: f64) -> f64 {
    cost_ms * beta * -u.ln()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn record(cost_ms: u64, remaining_ms: u64) -> CacheRecord {
        CacheRecord::hit(
            "{}".into(),
            Some(Duration::from_millis(cost_ms)),
            Some(Duration::from_millis(remaining_ms)),
        )
    }

    #[test]
    fn test_threshold() {
        assert_eq!(recompute_threshold(1000.0, 1.0, 1.0), 0.0);
        let threshold = recompute_threshold(1000.0, 2.0, 0.5);
        assert!((threshold - 2000.0 * std::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn test_miss_forces_recompute() {
        let decision = PerDecision::default();
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert!(decision.should_recompute_with(&CacheRecord::miss(), &mut rng));
        }
    }

    #[test]
    fn test_incomplete_record_forces_recompute() {
        let decision = PerDecision::default();
        let mut rng = StdRng::seed_from_u64(0);

        let no_delta = CacheRecord::hit("{}".into(), None, Some(Duration::from_secs(3600)));
        assert!(decision.should_recompute_with(&no_delta, &mut rng));

        let no_ttl = CacheRecord::hit("{}".into(), Some(Duration::from_millis(10)), None);
        assert!(decision.should_recompute_with(&no_ttl, &mut rng));

        // metadata outliving its value
        let no_value = CacheRecord {
            value: None,
            ..record(10, 3_600_000)
        };
        assert!(decision.should_recompute_with(&no_value, &mut rng));

        let not_hit = CacheRecord {
            hit: false,
            ..record(10, 3_600_000)
        };
        assert!(decision.should_recompute_with(&not_hit, &mut rng));
    }

    #[test]
    fn test_expired_always_recomputes() {
        let decision = PerDecision::default();
        for seed in 0..1000 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert!(decision.should_recompute_with(&record(50, 0), &mut rng));
        }
        // even an entry that was free to compute
        let mut rng = StdRng::seed_from_u64(7);
        assert!(decision.should_recompute_with(&record(0, 0), &mut rng));
    }

    #[test]
    fn test_fresh_cheap_entry_is_kept() {
        let decision = PerDecision::default();
        let mut rng = StdRng::seed_from_u64(42);
        let recomputed = (0..1000)
            .filter(|_| decision.should_recompute_with(&record(100, 3_600_000), &mut rng))
            .count();
        assert_eq!(recomputed, 0);
    }

    #[test]
    fn test_nearly_expired_expensive_entry() {
        // 1ms left on an entry that took 1s to compute: only draws of u above e^-0.001 keep it.
        let decision = PerDecision::default();
        let mut rng = StdRng::seed_from_u64(1234);
        let recomputed = (0..10_000)
            .filter(|_| decision.should_recompute_with(&record(1000, 1), &mut rng))
            .count();
        assert!(recomputed >= 9_950, "recomputed only {recomputed} times");
    }

    #[test]
    fn test_monotonic_in_remaining_freshness() {
        // With the same draw, less remaining freshness never turns a recompute into a keep.
        let decision = PerDecision::new(1.0);
        let remaining = [0, 10, 100, 500, 1000, 2000, 5000];
        let mut previous = usize::MAX;
        for remaining_ms in remaining {
            let recomputed = (0..2000)
                .filter(|&seed| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    decision.should_recompute_with(&record(1000, remaining_ms), &mut rng)
                })
                .count();
            assert!(recomputed <= previous);
            previous = recomputed;
        }

        for seed in 0..2000 {
            let shorter = decision
                .should_recompute_with(&record(1000, 200), &mut StdRng::seed_from_u64(seed));
            let longer = decision
                .should_recompute_with(&record(1000, 800), &mut StdRng::seed_from_u64(seed));
            assert!(shorter || !longer);
        }
    }

    #[test]
    fn test_zero_beta_only_recomputes_expired() {
        let decision = PerDecision::new(0.0);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(!decision.should_recompute_with(&record(10_000, 1), &mut rng));
        assert!(decision.should_recompute_with(&record(10_000, 0), &mut rng));
    }
}
