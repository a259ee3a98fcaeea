//! The scheduler's wire-agnostic unit of work (spec §3 "WorkItem").

use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::GatewayError;

/// Scheduling priority. Lower numeric value sorts first — `Final` always
/// preempts `Partial` per spec §4.2 ("if `P' < P`... preempt").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Priority 0 — finals. Never waits behind a partial once observable.
    Final = 0,
    /// Priority 1 — partial ticks.
    Partial = 1,
}

/// Successful result of a resolved [`WorkItem`]: the transcript, how long
/// the batch call took, and how long the item waited in queue before the
/// batch that served it was formed.
#[derive(Debug, Clone)]
pub struct WorkResult {
    /// Recognized text.
    pub text: String,
    /// Wall time spent inside `Worker::run_batch`.
    pub inference_duration: Duration,
    /// Wall time spent queued before batch formation began.
    pub queue_wait: Duration,
}

/// A single inference request submitted to the scheduler.
///
/// `seq` and `enqueue_monotonic` together form the scheduler's FIFO
/// tie-break key within a priority class (spec §3 "Scheduler queue").
pub struct WorkItem {
    /// Scheduling priority.
    pub priority: Priority,
    /// Monotonically increasing submission counter, used to break ties
    /// between items enqueued at the same monotonic instant.
    pub seq: u64,
    /// When this item was enqueued (monotonic clock).
    pub enqueue_monotonic: Instant,
    /// Float32 samples in `[-1.0, 1.0]`.
    pub waveform: Vec<f32>,
    /// Sample rate of `waveform`, in Hz.
    pub sample_rate: u32,
    /// Single-shot completion channel. Resolved exactly once by the
    /// scheduler (spec invariant 5): with `Ok(WorkResult)`, or with
    /// `Err(GatewayError::Inference(..))` on batch failure. Dropping the
    /// receiver (caller gave up) is a legal, silent "abandonment".
    pub result_sink: oneshot::Sender<Result<WorkResult, GatewayError>>,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .field("sample_rate", &self.sample_rate)
            .field("samples", &self.waveform.len())
            .finish_non_exhaustive()
    }
}
