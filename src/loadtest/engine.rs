//! Stage and schedule runners.
//!
//! [`LoadTestEngine`] is the top-level orchestrator:
//! - [`LoadTestEngine::run_stage`] fills a bounded queue with a stage's
//!   payloads, starts the [`Dispatcher`] and drains exactly one outcome per
//!   payload.
//! - [`LoadTestEngine::run`] executes the schedule strictly in order and hands
//!   each [`StageReport`] to the caller as soon as the stage completes.
//!
//! There is no mid-stage cancellation: a stage always drains to completion,
//! bounded by `ceil(requests / concurrency) * timeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::loadtest::client::Target;
use crate::loadtest::config::{LoadTestConfig, Stage};
use crate::loadtest::dispatch::Dispatcher;
use crate::loadtest::display::StageProgress;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{LiveRecorder, Outcome, StageReport};
use crate::loadtest::payload::{Payload, PayloadSource};
use crate::loadtest::sink::LatencySink;

/// Compile-time Send bounds verification for channel-transported types.
fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<Payload>();
    _assert_send::<Outcome>();
    _assert_send::<StageReport>();
}

/// What the engine writes while a stage drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Progress bar on stderr.
    #[default]
    Progress,
    /// Every response body on stdout, no progress bar.
    Verbose,
    /// Nothing.
    Silent,
}

/// Raw result of one stage, before aggregation.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Outcomes drained; always the stage's request count.
    pub requests: u64,
    pub failures: u64,
    /// Latencies of successful requests in milliseconds, in drain order.
    pub latencies_ms: Vec<f64>,
    /// Worker start to last outcome drained.
    pub elapsed: Duration,
    /// Failure count per error category.
    pub error_categories: HashMap<String, u64>,
}

/// Reports for every stage of a completed schedule.
#[derive(Debug, Clone)]
pub struct LoadTestResult {
    pub reports: Vec<StageReport>,
    /// Wall time of the whole schedule, payload generation included.
    pub elapsed: Duration,
}

impl LoadTestResult {
    pub fn total_requests(&self) -> u64 {
        self.reports.iter().map(|r| r.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.reports.iter().map(|r| r.failures).sum()
    }
}

/// Load test engine: configuration plus the collaborators every stage shares.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    target: Arc<dyn Target>,
    sink: Option<Arc<dyn LatencySink>>,
    output: OutputMode,
}

impl LoadTestEngine {
    /// Creates a new engine firing at `target`.
    pub fn new(config: LoadTestConfig, target: Arc<dyn Target>) -> Self {
        Self {
            config,
            target,
            sink: None,
            output: OutputMode::default(),
        }
    }

    /// Appends every request latency to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn LatencySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Returns a reference to the engine's configuration.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    pub fn output(&self) -> OutputMode {
        self.output
    }

    /// Run the whole schedule, calling `on_report` after each stage.
    ///
    /// Stages run strictly one after another: stage `k + 1` enqueues its first
    /// payload only after every outcome of stage `k` was drained. The first
    /// error aborts the schedule.
    pub async fn run<F>(
        &self,
        source: Arc<dyn PayloadSource>,
        mut on_report: F,
    ) -> Result<LoadTestResult, LoadTestError>
    where
        F: FnMut(&StageReport),
    {
        self.config.validate()?;

        let schedule = self.config.schedule();
        let total = schedule.len();
        let test_start = Instant::now();
        let mut reports = Vec::with_capacity(total);

        for (idx, stage) in schedule.into_iter().enumerate() {
            let label = format!("stage {}/{}", idx + 1, total);
            let result = self.run_stage(&stage, source.clone(), &label).await?;
            let report = StageReport::new(idx, total, stage, &result);
            on_report(&report);
            reports.push(report);
        }

        Ok(LoadTestResult {
            reports,
            elapsed: test_start.elapsed(),
        })
    }

    /// Run a single stage to completion.
    ///
    /// All payloads are produced and enqueued before any worker starts, so
    /// payload generation never counts towards request latency or stage wall
    /// time. Production runs on the blocking pool. Exactly `stage.requests`
    /// outcomes are drained.
    pub async fn run_stage(
        &self,
        stage: &Stage,
        source: Arc<dyn PayloadSource>,
        label: &str,
    ) -> Result<StageResult, LoadTestError> {
        let expected = stage.requests as usize;
        let regenerate = stage.regenerates(self.config.payload.regenerate);

        let announce = self.output != OutputMode::Silent;
        if announce {
            eprint!("Producing cannonballs for {label}... ");
        }
        let queue_rx = tokio::task::spawn_blocking(move || {
            fill_queue(source.as_ref(), expected, regenerate)
        })
        .await
        .map_err(|err| LoadTestError::Internal {
            message: format!("payload producer for {label} did not finish: {err}"),
        })
        .and_then(|filled| filled)
        .inspect_err(|_| {
            if announce {
                eprintln!("failed");
            }
        })?;
        if announce {
            eprintln!("done");
        }
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Outcome>(expected.max(1));

        if stage.concurrency > stage.requests {
            tracing::debug!(
                stage = label,
                idle = stage.concurrency - stage.requests,
                "more workers than requests, some will exit without firing"
            );
        }
        tracing::info!(
            stage = label,
            requests = stage.requests,
            concurrency = stage.concurrency,
            regenerate,
            "stage starting"
        );

        let dispatcher = Dispatcher::new(self.target.clone(), self.sink.clone());
        let active = dispatcher.active_workers();
        let progress = match self.output {
            OutputMode::Progress => Some(StageProgress::new(expected as u64, label)),
            OutputMode::Verbose | OutputMode::Silent => None,
        };

        let tracker = TaskTracker::new();
        let stage_start = Instant::now();
        dispatcher.spawn(&tracker, stage.concurrency, queue_rx, outcome_tx);
        tracker.close();

        let mut recorder = LiveRecorder::new();
        let mut latencies_ms = Vec::with_capacity(expected);
        let mut failures: u64 = 0;
        let mut error_categories: HashMap<String, u64> = HashMap::new();

        for drained in 0..expected {
            let Some(outcome) = outcome_rx.recv().await else {
                if let Some(progress) = &progress {
                    progress.finish();
                }
                return Err(LoadTestError::Internal {
                    message: format!(
                        "results channel closed after {drained} of {expected} outcomes in {label}"
                    ),
                });
            };

            recorder.record(&outcome);
            if outcome.success {
                latencies_ms.push(outcome.latency_ms());
            } else {
                failures += 1;
                let category = outcome
                    .error
                    .as_ref()
                    .map_or("unknown", |e| e.error_category());
                *error_categories.entry(category.to_owned()).or_insert(0) += 1;
            }

            match (&progress, self.output) {
                (Some(progress), _) => progress.advance(&recorder.snapshot(), active.get()),
                (None, OutputMode::Verbose) => println!("{}", outcome.body),
                _ => {},
            }
        }
        let elapsed = stage_start.elapsed();

        tracker.wait().await;
        if let Some(progress) = &progress {
            progress.finish();
        }
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.flush() {
                tracing::warn!(stage = label, error = %err, "failed to flush latency log");
            }
        }

        tracing::info!(
            stage = label,
            requests = expected,
            failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage finished"
        );

        Ok(StageResult {
            requests: expected as u64,
            failures,
            latencies_ms,
            elapsed,
            error_categories,
        })
    }
}

/// Produce `count` payloads into a closed queue sized to hold them all.
///
/// With `regenerate`, the source is called once per payload; otherwise once,
/// and the payload is shared.
fn fill_queue(
    source: &dyn PayloadSource,
    count: usize,
    regenerate: bool,
) -> Result<flume::Receiver<Payload>, LoadTestError> {
    let (queue_tx, queue_rx) = flume::bounded::<Payload>(count.max(1));
    let shared = if regenerate || count == 0 {
        None
    } else {
        Some(source.produce()?)
    };

    for _ in 0..count {
        let payload = match &shared {
            Some(payload) => payload.clone(),
            None => source.produce()?,
        };
        queue_tx
            .try_send(payload)
            .map_err(|err| LoadTestError::Internal {
                message: format!("work queue rejected a payload: {err}"),
            })?;
    }
    tracing::debug!(count, regenerate, "payload queue filled");

    Ok(queue_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::error::RequestError;
    use crate::loadtest::payload::StaticPayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Sleeps `delay`, then fails every `fail_every`-th request (1-based).
    struct FakeTarget {
        delay: Duration,
        fail_every: Option<u64>,
        seen: AtomicU64,
    }

    impl FakeTarget {
        fn new(delay: Duration, fail_every: Option<u64>) -> Self {
            Self {
                delay,
                fail_every,
                seen: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Target for FakeTarget {
        async fn fire(&self, _payload: &Payload) -> Result<String, RequestError> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            match self.fail_every {
                Some(k) if n % k == 0 => Err(RequestError::Http {
                    status: 500,
                    body: "boom".to_string(),
                }),
                _ => Ok("ok".to_string()),
            }
        }
    }

    /// Counts how often it was asked for a payload.
    #[derive(Default)]
    struct CountingSource {
        produced: AtomicU64,
    }

    impl PayloadSource for CountingSource {
        fn produce(&self) -> Result<Payload, LoadTestError> {
            let n = self.produced.fetch_add(1, Ordering::SeqCst);
            Ok(Payload::new(n.to_string()))
        }
    }

    struct FailingSource;

    impl PayloadSource for FailingSource {
        fn produce(&self) -> Result<Payload, LoadTestError> {
            Err(LoadTestError::Payload {
                message: "no image".to_string(),
            })
        }
    }

    fn engine(config: LoadTestConfig, target: FakeTarget) -> LoadTestEngine {
        LoadTestEngine::new(config, Arc::new(target)).with_output(OutputMode::Silent)
    }

    #[test]
    fn test_load_test_engine_builder() {
        let engine = LoadTestEngine::new(
            LoadTestConfig::default(),
            Arc::new(FakeTarget::new(Duration::ZERO, None)),
        )
        .with_output(OutputMode::Verbose);

        assert_eq!(engine.output(), OutputMode::Verbose);
        assert_eq!(engine.config().settings.num_clients, 8);
    }

    #[tokio::test]
    async fn test_run_stage_drains_every_outcome() {
        let engine = engine(
            LoadTestConfig::default(),
            FakeTarget::new(Duration::from_millis(2), Some(4)),
        );
        let result = engine
            .run_stage(&Stage::new(12, 3), Arc::new(StaticPayload::new("x")), "stage 1/1")
            .await
            .unwrap();

        assert_eq!(result.requests, 12);
        assert_eq!(result.failures, 3);
        assert_eq!(result.latencies_ms.len(), 9);
        assert_eq!(result.error_categories.get("http"), Some(&3));
        assert!(result.elapsed > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_run_stage_regenerates_per_request() {
        let engine = engine(
            LoadTestConfig::default(),
            FakeTarget::new(Duration::ZERO, None),
        );
        let source = Arc::new(CountingSource::default());
        engine
            .run_stage(&Stage::new(5, 2), source.clone(), "stage 1/1")
            .await
            .unwrap();
        assert_eq!(source.produced.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_run_stage_reuses_payload_without_regenerate() {
        let engine = engine(
            LoadTestConfig::default(),
            FakeTarget::new(Duration::ZERO, None),
        );
        let source = Arc::new(CountingSource::default());
        let stage = Stage {
            regenerate: Some(false),
            ..Stage::new(5, 2)
        };
        engine
            .run_stage(&stage, source.clone(), "stage 1/1")
            .await
            .unwrap();
        assert_eq!(source.produced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stage_payload_error_is_fatal() {
        let engine = engine(
            LoadTestConfig::default(),
            FakeTarget::new(Duration::ZERO, None),
        );
        let err = engine
            .run_stage(&Stage::new(3, 1), Arc::new(FailingSource), "stage 1/1")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadTestError::Payload { .. }));
    }

    #[tokio::test]
    async fn test_run_reports_each_stage_in_order() {
        let config = LoadTestConfig {
            stage: vec![Stage::new(3, 1), Stage::new(4, 4), Stage::new(2, 8)],
            ..LoadTestConfig::default()
        };
        let engine = engine(config, FakeTarget::new(Duration::from_millis(1), None));

        let mut labels = Vec::new();
        let result = engine
            .run(Arc::new(StaticPayload::new("x")), |report| {
                labels.push(report.label())
            })
            .await
            .unwrap();

        assert_eq!(labels, vec!["stage 1/3", "stage 2/3", "stage 3/3"]);
        let counts: Vec<u64> = result.reports.iter().map(|r| r.requests).collect();
        assert_eq!(counts, vec![3, 4, 2]);
        assert_eq!(result.total_requests(), 9);
        assert_eq!(result.total_failures(), 0);
    }

    #[tokio::test]
    async fn test_run_without_stages_uses_settings() {
        let mut config = LoadTestConfig::default();
        config.settings.num_requests = 6;
        config.settings.num_clients = 2;
        let engine = engine(config, FakeTarget::new(Duration::ZERO, None));

        let result = engine
            .run(Arc::new(StaticPayload::new("x")), |_| {})
            .await
            .unwrap();
        assert_eq!(result.reports.len(), 1);
        assert_eq!(result.reports[0].stage, Stage::new(6, 2));
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let config = LoadTestConfig {
            stage: vec![Stage::new(0, 1)],
            ..LoadTestConfig::default()
        };
        let engine = engine(config, FakeTarget::new(Duration::ZERO, None));
        let err = engine
            .run(Arc::new(StaticPayload::new("x")), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigValidation { .. }));
    }

    /// Panics on its first append, records the rest.
    #[derive(Default)]
    struct PanicOnceSink {
        appended: AtomicU64,
    }

    impl LatencySink for PanicOnceSink {
        fn append(&self, _latency: Duration) -> std::io::Result<()> {
            if self.appended.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("latency log exploded");
            }
            Ok(())
        }

        fn flush(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_stage_survives_panicking_sink() {
        let sink = Arc::new(PanicOnceSink::default());
        let engine = engine(
            LoadTestConfig::default(),
            FakeTarget::new(Duration::from_millis(1), None),
        )
        .with_sink(sink.clone());

        let result = engine
            .run_stage(&Stage::new(10, 2), Arc::new(StaticPayload::new("x")), "stage 1/1")
            .await
            .unwrap();

        assert_eq!(result.requests, 10);
        assert_eq!(result.failures, 0);
        assert_eq!(result.latencies_ms.len(), 10);
        assert_eq!(sink.appended.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_fill_queue_is_closed_and_full() {
        let rx = fill_queue(&StaticPayload::new("x"), 3, true).unwrap();
        assert_eq!(rx.len(), 3);
        assert!(rx.is_disconnected(), "producer side should be dropped");
    }
}
