//! Nearest-rank percentiles.
//!
//! The index for percentile `p` over `n` sorted samples is `floor(n * p)`,
//! clamped to `[0, n - 1]`. No interpolation is performed, so every reported
//! percentile is a value that was actually observed. This slightly
//! under-estimates high percentiles compared with interpolating methods;
//! historical reports were produced with exactly this formula and stay
//! comparable only if it is reproduced bit for bit (including the `f64`
//! multiply before flooring).

use serde::{Deserialize, Serialize};

/// Index of percentile `p` (a fraction in `[0, 1]`) in a sorted slice of `n` items.
///
/// Returns `None` for an empty slice.
pub fn nearest_rank_index(n: usize, p: f64) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let raw = (n as f64 * p).floor();
    let idx = if raw.is_nan() || raw < 0.0 {
        0
    } else {
        raw as usize
    };
    Some(idx.min(n - 1))
}

/// Percentile `p` of an ascending-sorted slice.
pub fn percentile_sorted<T: Copy>(sorted: &[T], p: f64) -> Option<T> {
    nearest_rank_index(sorted.len(), p).map(|idx| sorted[idx])
}

/// The latency percentiles reported per prompt version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

impl LatencyPercentiles {
    /// Compute p50/p95/p99 from unsorted samples. All zero when empty.
    pub fn from_samples(samples: &[u64]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        Self::from_sorted(&sorted)
    }

    /// Compute p50/p95/p99 from samples already sorted ascending.
    pub fn from_sorted(sorted: &[u64]) -> Self {
        Self {
            p50: percentile_sorted(sorted, 0.50).unwrap_or(0),
            p95: percentile_sorted(sorted, 0.95).unwrap_or(0),
            p99: percentile_sorted(sorted, 0.99).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_has_no_index() {
        assert_eq!(nearest_rank_index(0, 0.5), None);
        assert_eq!(LatencyPercentiles::from_samples(&[]), LatencyPercentiles::default());
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let p = LatencyPercentiles::from_samples(&[420]);
        assert_eq!(p, LatencyPercentiles { p50: 420, p95: 420, p99: 420 });
    }

    #[test]
    fn index_formula_matches_floor_of_product() {
        // n = 100: floor(100 * 0.95) = 95, floor(100 * 0.99) = 99
        assert_eq!(nearest_rank_index(100, 0.50), Some(50));
        assert_eq!(nearest_rank_index(100, 0.95), Some(95));
        assert_eq!(nearest_rank_index(100, 0.99), Some(99));
        // n = 10: floor(9.5) = 9, floor(9.9) = 9
        assert_eq!(nearest_rank_index(10, 0.95), Some(9));
        assert_eq!(nearest_rank_index(10, 0.99), Some(9));
        // p = 1.0 clamps to the last element
        assert_eq!(nearest_rank_index(10, 1.0), Some(9));
    }

    #[test]
    fn one_to_hundred() {
        let samples: Vec<u64> = (1..=100).collect();
        let p = LatencyPercentiles::from_samples(&samples);
        assert_eq!(p.p50, 51);
        assert_eq!(p.p95, 96);
        assert_eq!(p.p99, 100);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let p = LatencyPercentiles::from_samples(&[900, 100, 500, 300, 700]);
        // n = 5: idx50 = 2, idx95 = 4, idx99 = 4
        assert_eq!(p.p50, 500);
        assert_eq!(p.p95, 900);
        assert_eq!(p.p99, 900);
    }

    proptest! {
        #[test]
        fn percentiles_monotone_and_observed(samples in prop::collection::vec(0u64..100_000, 1..500)) {
            let p = LatencyPercentiles::from_samples(&samples);
            prop_assert!(p.p50 <= p.p95);
            prop_assert!(p.p95 <= p.p99);
            prop_assert!(samples.contains(&p.p50));
            prop_assert!(samples.contains(&p.p95));
            prop_assert!(samples.contains(&p.p99));
        }

        #[test]
        fn index_always_in_bounds(n in 1usize..10_000, p in 0.0f64..=1.0) {
            let idx = nearest_rank_index(n, p).unwrap();
            prop_assert!(idx < n);
        }
    }
}
