//! Priority micro-batching scheduler (spec §4.2).
//!
//! A single GPU lane serializes every inference call. `Final` work (priority
//! 0) always preempts `Partial` work (priority 1) waiting in queue; items of
//! the same priority are coalesced into batches up to `max_batch` within a
//! short aggregation window.

mod aggregator;
mod queue;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use asrg_core::{GatewayError, Priority, WorkItem, WorkResult};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use worker::InferenceWorker;

use queue::PriorityQueue;

/// A priority micro-batching scheduler in front of a single [`InferenceWorker`].
///
/// Clone is cheap: `submit` only needs a channel handle, so `MicroBatchScheduler`
/// is typically held behind an `Arc` and shared across every session task.
pub struct MicroBatchScheduler {
    queue: PriorityQueue,
    seq: AtomicU64,
    maxsize: usize,
    window: Duration,
    max_batch: usize,
    aggregator: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MicroBatchScheduler {
    /// Construct a scheduler. Call [`Self::start`] once to begin aggregating;
    /// `submit` works before `start` but items will not be drained until it
    /// is called.
    #[must_use]
    pub fn new(maxsize: usize, window_ms: u64, max_batch: usize) -> Self {
        Self {
            queue: PriorityQueue::new(maxsize),
            seq: AtomicU64::new(0),
            maxsize,
            window: Duration::from_millis(window_ms),
            max_batch: max_batch.max(1),
            aggregator: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the aggregator task that drains the queue and drives `worker`.
    pub fn start(self: &Arc<Self>, worker: Arc<dyn InferenceWorker>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            aggregator::run(this, worker).await;
        });
        *self.aggregator.lock().expect("aggregator mutex poisoned") = Some(handle);
    }

    /// Cancel the aggregator task and wait for it to finish.
    pub async fn stop(&self) {
        let handle = self.aggregator.lock().expect("aggregator mutex poisoned").take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Submit a waveform for inference at the given priority.
    ///
    /// Returns `Err(GatewayError::QueueFull)` immediately if the queue is at
    /// capacity (spec §4.2 "Backpressure") instead of blocking the caller.
    pub fn submit(
        &self,
        waveform: Vec<f32>,
        sample_rate: u32,
        priority: Priority,
    ) -> Result<oneshot::Receiver<Result<WorkResult, GatewayError>>, GatewayError> {
        let (tx, rx) = oneshot::channel();
        let item = WorkItem {
            priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            enqueue_monotonic: Instant::now(),
            waveform,
            sample_rate,
            result_sink: tx,
        };
        self.queue.try_push(item).map_err(|_| GatewayError::QueueFull {
            maxsize: self.maxsize,
        })?;
        Ok(rx)
    }

    /// Current number of items waiting in queue.
    #[must_use]
    pub fn qsize(&self) -> usize {
        self.queue.len()
    }

    /// Configured queue capacity.
    #[must_use]
    pub const fn maxsize(&self) -> usize {
        self.maxsize
    }

    /// Fraction of queue capacity currently in use, used by the session's
    /// decimation policy (spec §4.3 step 5) to decide whether the pipe is
    /// "hot".
    #[must_use]
    pub fn load_fraction(&self) -> f64 {
        if self.maxsize == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let frac = self.qsize() as f64 / self.maxsize as f64;
        frac
    }

    pub(crate) const fn window(&self) -> Duration {
        self.window
    }

    pub(crate) const fn max_batch(&self) -> usize {
        self.max_batch
    }

    pub(crate) fn queue(&self) -> &PriorityQueue {
        &self.queue
    }
}
