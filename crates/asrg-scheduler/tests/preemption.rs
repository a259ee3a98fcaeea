//! Integration tests for `MicroBatchScheduler`'s preemption and batching
//! behavior, using a deterministic fake `InferenceWorker`.
//!
//! No GPU, model files, or real audio is required — the fake worker just
//! echoes a canned transcript per input.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asrg_core::Priority;
use asrg_scheduler::{InferenceWorker, MicroBatchScheduler};

struct FakeWorker {
    calls: AtomicUsize,
    max_batch_seen: AtomicUsize,
}

impl FakeWorker {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            max_batch_seen: AtomicUsize::new(0),
        }
    }
}

impl InferenceWorker for FakeWorker {
    fn run_batch(&self, waveforms: &[Vec<f32>], _sample_rates: &[u32]) -> Result<Vec<String>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.max_batch_seen.fetch_max(waveforms.len(), Ordering::SeqCst);
        Ok(waveforms.iter().map(|w| format!("len={}", w.len())).collect())
    }
}

#[tokio::test]
async fn final_resolves_before_earlier_queued_partial() {
    let scheduler = Arc::new(MicroBatchScheduler::new(32, 50, 4));
    let worker = Arc::new(FakeWorker::new());
    scheduler.start(worker);

    // Submit a partial first, then a final: the final must be served first
    // because it preempts (spec §4.2).
    let partial_rx = scheduler
        .submit(vec![0.0; 100], 16_000, Priority::Partial)
        .expect("submit ok");
    let final_rx = scheduler
        .submit(vec![0.0; 200], 16_000, Priority::Final)
        .expect("submit ok");

    let final_result = final_rx.await.expect("final resolved").expect("inference ok");
    assert_eq!(final_result.text, "len=200");

    let partial_result = partial_rx.await.expect("partial resolved").expect("inference ok");
    assert_eq!(partial_result.text, "len=100");
}

#[tokio::test]
async fn final_preempts_partial_already_mid_collection() {
    // Window wide enough that the aggregator is still inside collect_window
    // for the partial (not yet dispatched to the worker) when the final
    // lands, so heap ordering at the first `pop()` can't be what delivers
    // the final first.
    let scheduler = Arc::new(MicroBatchScheduler::new(32, 300, 4));
    let worker = Arc::new(FakeWorker::new());
    scheduler.start(Arc::clone(&worker));

    let partial_rx = scheduler
        .submit(vec![0.0; 10], 16_000, Priority::Partial)
        .expect("submit ok");

    // Give the aggregator time to pop the partial and enter collect_window.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let final_rx = scheduler
        .submit(vec![0.0; 20], 16_000, Priority::Final)
        .expect("submit ok");

    let final_result = final_rx.await.expect("final resolved").expect("inference ok");
    assert_eq!(final_result.text, "len=20");

    let partial_result = partial_rx.await.expect("partial resolved").expect("inference ok");
    assert_eq!(partial_result.text, "len=10");
}

#[tokio::test]
async fn same_priority_items_batch_together() {
    let scheduler = Arc::new(MicroBatchScheduler::new(32, 200, 8));
    let worker = Arc::new(FakeWorker::new());
    scheduler.start(Arc::clone(&worker));

    let mut receivers = Vec::new();
    for _ in 0..4 {
        receivers.push(
            scheduler
                .submit(vec![0.0; 10], 16_000, Priority::Partial)
                .expect("submit ok"),
        );
    }

    for rx in receivers {
        rx.await.expect("resolved").expect("inference ok");
    }

    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(worker.max_batch_seen.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn queue_full_rejects_submission() {
    let scheduler = Arc::new(MicroBatchScheduler::new(1, 10_000, 1));
    // Don't start the aggregator: nothing drains the queue, so the second
    // submit observes it at capacity.
    let _held = scheduler
        .submit(vec![0.0; 1], 16_000, Priority::Partial)
        .expect("first submit ok");
    let second = scheduler.submit(vec![0.0; 1], 16_000, Priority::Partial);
    assert!(second.is_err());
}

#[tokio::test]
async fn worker_error_fails_every_item_in_the_batch() {
    struct FailingWorker;
    impl InferenceWorker for FailingWorker {
        fn run_batch(&self, _waveforms: &[Vec<f32>], _sample_rates: &[u32]) -> Result<Vec<String>, String> {
            Err("model OOM".to_string())
        }
    }

    let scheduler = Arc::new(MicroBatchScheduler::new(32, 50, 4));
    scheduler.start(Arc::new(FailingWorker));

    let rx_a = scheduler.submit(vec![0.0; 1], 16_000, Priority::Partial).unwrap();
    let rx_b = scheduler.submit(vec![0.0; 1], 16_000, Priority::Partial).unwrap();

    // Give the aggregator a moment to form the batch within its window.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(rx_a.await.unwrap().is_err());
    assert!(rx_b.await.unwrap().is_err());
}
