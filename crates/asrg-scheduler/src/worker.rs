//! The single-lane GPU inference worker (spec §3 "Inference Worker").

/// A batched speech recognizer. Exactly one call to [`run_batch`] is ever
/// in flight at a time — the scheduler serializes access, mirroring a
/// single-owner GPU handle.
///
/// Implementations are expected to do synchronous, CPU/GPU-bound work; the
/// scheduler always calls `run_batch` via `tokio::task::spawn_blocking`, so
/// implementations should not themselves spawn onto a blocking pool.
pub trait InferenceWorker: Send + Sync + 'static {
    /// Run inference over a batch of same-priority waveforms, returning one
    /// transcript per input in the same order. A single `Err` fails the
    /// whole batch: every item in it observes the same error (spec §4.2
    /// "Batch-level failure").
    fn run_batch(&self, waveforms: &[Vec<f32>], sample_rates: &[u32]) -> Result<Vec<String>, String>;
}
