//! Fixed-size worker pool that fires one stage's payloads.
//!
//! The [`Dispatcher`] spawns `concurrency` workers onto a
//! [`TaskTracker`]. Each worker pulls payloads from a shared multi-consumer
//! queue until it is closed and drained, fires them at the [`Target`] and
//! pushes exactly one [`Outcome`] per payload into the results channel.
//!
//! Workers never talk to each other. A failed or panicking request becomes a
//! failed outcome; nothing a single request does can take the pool down or
//! lose an outcome slot.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::loadtest::client::Target;
use crate::loadtest::error::RequestError;
use crate::loadtest::metrics::Outcome;
use crate::loadtest::payload::Payload;
use crate::loadtest::sink::LatencySink;

/// Atomic counter tracking the number of currently running workers.
///
/// Lightweight wrapper around `Arc<AtomicU32>` for clone-friendly sharing
/// across worker tasks and the engine.
#[derive(Clone, Debug)]
pub struct ActiveWorkerCounter(Arc<AtomicU32>);

impl ActiveWorkerCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of running workers.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveWorkerCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns and feeds the worker pool for a stage.
///
/// Holds the collaborators shared by every worker of every stage: the target,
/// the optional latency sink and the active-worker counter.
#[derive(Clone)]
pub struct Dispatcher {
    target: Arc<dyn Target>,
    sink: Option<Arc<dyn LatencySink>>,
    active: ActiveWorkerCounter,
}

impl Dispatcher {
    pub fn new(target: Arc<dyn Target>, sink: Option<Arc<dyn LatencySink>>) -> Self {
        Self {
            target,
            sink,
            active: ActiveWorkerCounter::new(),
        }
    }

    /// The counter of running workers, shared with the spawned tasks.
    pub fn active_workers(&self) -> ActiveWorkerCounter {
        self.active.clone()
    }

    /// Spawn `concurrency` workers onto `tracker`.
    ///
    /// Workers exit once `queue` is closed (all senders dropped) and empty, or
    /// once the outcome receiver is gone. Each one holds a clone of
    /// `outcome_tx`, so the results channel closes when the last worker exits.
    pub fn spawn(
        &self,
        tracker: &TaskTracker,
        concurrency: u32,
        queue: flume::Receiver<Payload>,
        outcome_tx: mpsc::Sender<Outcome>,
    ) {
        for worker_id in 0..concurrency {
            tracker.spawn(worker_loop(
                worker_id,
                self.target.clone(),
                queue.clone(),
                outcome_tx.clone(),
                self.sink.clone(),
                self.active.clone(),
            ));
        }
    }
}

/// Main worker task loop.
///
/// The `active` counter is incremented on entry and decremented on exit.
pub async fn worker_loop(
    worker_id: u32,
    target: Arc<dyn Target>,
    queue: flume::Receiver<Payload>,
    outcome_tx: mpsc::Sender<Outcome>,
    sink: Option<Arc<dyn LatencySink>>,
    active: ActiveWorkerCounter,
) {
    active.increment();
    tracing::debug!(worker_id, "worker started");

    let mut fired: u64 = 0;
    while let Ok(payload) = queue.recv_async().await {
        let outcome = fire_one(target.as_ref(), &payload).await;
        fired += 1;

        if let Some(sink) = &sink {
            record_latency(worker_id, sink.as_ref(), outcome.latency);
        }

        if outcome_tx.send(outcome).await.is_err() {
            tracing::debug!(worker_id, "outcome receiver dropped, stopping");
            break;
        }
    }

    tracing::debug!(worker_id, fired, "worker finished");
    active.decrement();
}

/// Fire one payload and time it. Panics inside the target are caught.
async fn fire_one(target: &dyn Target, payload: &Payload) -> Outcome {
    let start = Instant::now();
    let result = AssertUnwindSafe(target.fire(payload)).catch_unwind().await;
    let latency = start.elapsed();

    match result {
        Ok(Ok(body)) => Outcome::success(body, latency),
        Ok(Err(err)) => Outcome::failure(err, latency),
        Err(panic) => Outcome::failure(
            RequestError::Internal {
                message: panic_message(panic.as_ref()),
            },
            latency,
        ),
    }
}

/// Append to the latency log. Errors and panics are logged, never propagated.
fn record_latency(worker_id: u32, sink: &dyn LatencySink, latency: Duration) {
    match std::panic::catch_unwind(AssertUnwindSafe(|| sink.append(latency))) {
        Ok(Ok(())) => {},
        Ok(Err(err)) => {
            tracing::warn!(worker_id, error = %err, "failed to append to latency log");
        },
        Err(panic) => {
            tracing::warn!(
                worker_id,
                panic = %panic_message(panic.as_ref()),
                "latency log panicked, outcome kept"
            );
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
