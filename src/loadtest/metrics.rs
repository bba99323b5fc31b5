//! Outcome records and the statistics computed from them.
//!
//! Two consumers read the outcome stream:
//!
//! - [`LiveRecorder`]: an HdrHistogram fed while a stage is draining, used
//!   only for the live progress line (p95, ok/failed counts).
//! - [`LatencyStats`] / [`StageReport`]: the exact end-of-stage aggregate,
//!   computed from the full vector of successful latencies.
//!
//! # Percentiles
//!
//! [`percentile`] uses linear interpolation between order statistics: for a
//! sorted sample `x` of length `n`, rank `r = p/100 * (n - 1)` and the value is
//! `x[floor(r)] + frac(r) * (x[ceil(r)] - x[floor(r)])`. Percentile 0 is the
//! minimum and percentile 100 the maximum.
//!
//! # Degenerate input
//!
//! An empty latency set produces `NaN` for every latency statistic; counts stay
//! exact. A zero elapsed time produces `NaN` throughput. These are sentinels,
//! not errors.

use std::collections::HashMap;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::loadtest::config::Stage;
use crate::loadtest::engine::StageResult;
use crate::loadtest::error::RequestError;

/// Percentiles shown in the report table, in column order.
pub const REPORT_PERCENTILES: [f64; 6] = [50.0, 80.0, 90.0, 95.0, 99.0, 100.0];

/// The result of one dispatched request.
///
/// Created via [`Outcome::success`] or [`Outcome::failure`]. Produced exactly
/// once per payload by the worker that fired it.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Response text on success, diagnostic text on failure.
    pub body: String,
    /// Whether a 2xx response arrived within the timeout.
    pub success: bool,
    /// Wall-clock time from send to response (or error).
    pub latency: Duration,
    /// Classification of the failure, `None` on success.
    pub error: Option<RequestError>,
}

impl Outcome {
    /// A successful request carrying the response body.
    pub fn success(body: String, latency: Duration) -> Self {
        Self {
            body,
            success: true,
            latency,
            error: None,
        }
    }

    /// A failed request. The body is the error's diagnostic text.
    pub fn failure(error: RequestError, latency: Duration) -> Self {
        Self {
            body: error.to_string(),
            success: false,
            latency,
            error: Some(error),
        }
    }

    /// Latency in fractional milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// Linear-interpolation percentile of an ascending-sorted sample.
///
/// `p` is clamped to `0.0..=100.0`. Returns `NaN` for an empty sample.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    (sorted[lower] + frac * (sorted[upper] - sorted[lower])).min(sorted[upper])
}

/// Summary statistics over a set of latencies, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    /// Number of latencies summarised.
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Values at [`REPORT_PERCENTILES`], same order.
    pub percentiles: [f64; 6],
}

impl LatencyStats {
    /// Compute statistics over `latencies_ms`. Input order does not matter.
    pub fn from_latencies(latencies_ms: &[f64]) -> Self {
        if latencies_ms.is_empty() {
            return Self {
                count: 0,
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                median: f64::NAN,
                percentiles: [f64::NAN; 6],
            };
        }

        let mut sorted = latencies_ms.to_vec();
        sorted.sort_by(f64::total_cmp);

        let sum: f64 = sorted.iter().sum();
        let percentiles = REPORT_PERCENTILES.map(|p| percentile(&sorted, p));

        Self {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum / sorted.len() as f64,
            median: percentile(&sorted, 50.0),
            percentiles,
        }
    }
}

/// Requests per second, or `NaN` when no time elapsed.
pub fn throughput(requests: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        requests as f64 / secs
    } else {
        f64::NAN
    }
}

/// Aggregate report for one completed stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Zero-based position in the schedule.
    pub stage_index: usize,
    /// Number of stages in the schedule.
    pub stage_count: usize,
    /// The stage that was run.
    pub stage: Stage,
    /// Requests dispatched (successes and failures).
    pub requests: u64,
    pub failures: u64,
    /// Worker start to last outcome drained.
    pub elapsed: Duration,
    /// Requests per second over `elapsed`.
    pub throughput: f64,
    /// Statistics over successful latencies only.
    pub latency: LatencyStats,
    /// Failure count per [`RequestError::error_category`].
    pub error_categories: HashMap<String, u64>,
}

impl StageReport {
    /// Aggregate a stage runner result.
    pub fn new(
        stage_index: usize,
        stage_count: usize,
        stage: Stage,
        result: &StageResult,
    ) -> Self {
        Self {
            stage_index,
            stage_count,
            stage,
            requests: result.requests,
            failures: result.failures,
            elapsed: result.elapsed,
            throughput: throughput(result.requests, result.elapsed),
            latency: LatencyStats::from_latencies(&result.latencies_ms),
            error_categories: result.error_categories.clone(),
        }
    }

    /// Label such as `"stage 2/3"`.
    pub fn label(&self) -> String {
        format!("stage {}/{}", self.stage_index + 1, self.stage_count)
    }
}

/// Snapshot of a [`LiveRecorder`] for the progress line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSnapshot {
    pub completed: u64,
    pub failures: u64,
    /// Success latency P95 in milliseconds, 0 before the first success.
    pub p95_ms: u64,
}

/// HdrHistogram-backed recorder updated as outcomes drain.
///
/// Millisecond resolution, 3 significant figures, auto-resize.
pub struct LiveRecorder {
    histogram: Histogram<u64>,
    completed: u64,
    failures: u64,
}

impl LiveRecorder {
    pub fn new() -> Self {
        let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
        histogram.auto(true);
        Self {
            histogram,
            completed: 0,
            failures: 0,
        }
    }

    /// Record one outcome. Only successful latencies enter the histogram.
    pub fn record(&mut self, outcome: &Outcome) {
        self.completed += 1;
        if outcome.success {
            let ms = outcome.latency.as_millis() as u64;
            let _ = self.histogram.record(ms);
        } else {
            self.failures += 1;
        }
    }

    /// Success latency P95 in milliseconds. Returns 0 if no samples recorded.
    pub fn p95(&self) -> u64 {
        if self.histogram.is_empty() {
            return 0;
        }
        self.histogram.value_at_quantile(0.95)
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            completed: self.completed,
            failures: self.failures,
            p95_ms: self.p95(),
        }
    }
}

impl Default for LiveRecorder {
    fn default() -> Self {
        Self::new()
    }
}
