//! Property-based tests for aggregator invariants.
//!
//! These tests use proptest to verify that the statistics hold across a wide
//! range of random latency sets and stage results.

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use cannonade::loadtest::config::Stage;
use cannonade::loadtest::engine::StageResult;
use cannonade::loadtest::metrics::{percentile, throughput, LatencyStats, StageReport};

fn latencies() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..10_000.0, 1..200)
}

proptest! {
    /// Percentile 100 of a non-empty sample is its maximum, percentile 0 its minimum.
    #[test]
    fn percentile_extremes_are_min_and_max(sample in latencies()) {
        let mut sorted = sample.clone();
        sorted.sort_by(f64::total_cmp);
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];

        prop_assert_eq!(percentile(&sorted, 100.0), max);
        prop_assert_eq!(percentile(&sorted, 0.0), min);
    }

    /// Percentiles never decrease as p grows and stay within [min, max].
    #[test]
    fn report_percentiles_are_monotonic(sample in latencies()) {
        let stats = LatencyStats::from_latencies(&sample);
        for pair in stats.percentiles.windows(2) {
            prop_assert!(pair[0] <= pair[1], "{:?}", stats.percentiles);
        }
        prop_assert!(stats.min <= stats.percentiles[0]);
        prop_assert_eq!(stats.percentiles[5], stats.max);
        prop_assert!(stats.mean >= stats.min - 1e-6 && stats.mean <= stats.max + 1e-6);
        prop_assert_eq!(stats.median, stats.percentiles[0]);
    }

    /// Aggregation does not depend on the order outcomes were drained in.
    #[test]
    fn stats_ignore_input_order(sample in latencies()) {
        let mut reversed = sample.clone();
        reversed.reverse();
        let a = LatencyStats::from_latencies(&sample);
        let b = LatencyStats::from_latencies(&reversed);
        prop_assert_eq!(a.min, b.min);
        prop_assert_eq!(a.max, b.max);
        prop_assert_eq!(a.median, b.median);
        prop_assert_eq!(a.percentiles, b.percentiles);
    }

    /// Latency count equals requests minus failures; counts survive aggregation.
    #[test]
    fn report_counts_are_exact(
        successes in 0usize..100,
        failures in 0u64..100,
        elapsed_ms in 1u64..60_000,
    ) {
        let requests = successes as u64 + failures;
        prop_assume!(requests > 0);
        let result = StageResult {
            requests,
            failures,
            latencies_ms: vec![12.5; successes],
            elapsed: Duration::from_millis(elapsed_ms),
            error_categories: HashMap::new(),
        };
        let report = StageReport::new(0, 1, Stage::new(requests as u32, 4), &result);

        prop_assert_eq!(report.requests, requests);
        prop_assert_eq!(report.failures, failures);
        prop_assert_eq!(report.latency.count as u64, requests - failures);
        prop_assert_eq!(report.latency.median.is_nan(), successes == 0);
    }

    /// Throughput is positive and finite whenever time elapsed.
    #[test]
    fn throughput_positive_and_finite(requests in 1u64..1_000_000, elapsed_us in 1u64..10_000_000_000) {
        let rps = throughput(requests, Duration::from_micros(elapsed_us));
        prop_assert!(rps.is_finite());
        prop_assert!(rps > 0.0);
    }
}

#[test]
fn empty_sample_is_all_nan() {
    let stats = LatencyStats::from_latencies(&[]);
    assert_eq!(stats.count, 0);
    assert!(stats.min.is_nan() && stats.max.is_nan() && stats.mean.is_nan());
    assert!(stats.percentiles.iter().all(|p| p.is_nan()));
}
