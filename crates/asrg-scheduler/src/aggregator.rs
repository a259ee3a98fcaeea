//! The aggregator task: drains the priority queue, forms batches of
//! same-priority items bounded by a time window, and hands each batch to
//! the [`InferenceWorker`] via `spawn_blocking`.

use std::sync::Arc;
use std::time::Instant;

use asrg_core::{Priority, WorkItem, WorkResult};
use tracing::{error, warn};

use crate::worker::InferenceWorker;
use crate::MicroBatchScheduler;

pub(crate) async fn run(scheduler: Arc<MicroBatchScheduler>, worker: Arc<dyn InferenceWorker>) {
    loop {
        let Some(first) = next_item(&scheduler).await else {
            continue;
        };
        let priority = first.priority;
        let mut batch = vec![first];

        if collect_window(&scheduler, priority, &mut batch).await {
            // A higher-priority item showed up mid-collection: give back
            // everything gathered so far so the preempting batch is formed
            // and dispatched first (spec §4.2 step 2), instead of running
            // this lower-priority batch ahead of it.
            requeue(&scheduler, batch);
            continue;
        }

        run_batch(&worker, batch).await;
    }
}

/// Push every item in `batch` back onto the queue, in original enqueue
/// order, after a preemption. The queue re-sorts by `(priority,
/// enqueue_monotonic, seq)`, so this doesn't disturb each item's place
/// relative to other same-priority work.
fn requeue(scheduler: &Arc<MicroBatchScheduler>, batch: Vec<WorkItem>) {
    for item in batch {
        if let Err(dropped) = scheduler.queue().try_push(item) {
            warn!("queue full on preemption requeue, dropping item");
            let _ = dropped
                .result_sink
                .send(Err(asrg_core::GatewayError::Inference("queue full on preemption requeue".to_string())));
        }
    }
}

/// Block until an item is available, honoring preemption: if a `Final`
/// arrives while we're only holding lower-priority items, the blocked
/// `Partial` batch is never formed — `pop` always returns the
/// lowest-priority head, so this simply yields whatever is now at the
/// front.
async fn next_item(scheduler: &Arc<MicroBatchScheduler>) -> Option<WorkItem> {
    loop {
        if let Some(item) = scheduler.queue().pop() {
            return Some(item);
        }
        scheduler.queue().notified().await;
    }
}

/// Collect same-priority items into `batch` until `max_batch` is reached or
/// the aggregation window elapses. A higher-priority arrival preempts:
/// collection stops immediately and `true` is returned so the caller
/// requeues everything gathered so far instead of dispatching it, and the
/// preempting item is picked up first on the next `next_item`.
async fn collect_window(scheduler: &Arc<MicroBatchScheduler>, priority: Priority, batch: &mut Vec<WorkItem>) -> bool {
    let deadline = Instant::now() + scheduler.window();
    while batch.len() < scheduler.max_batch() {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        if remaining.is_zero() {
            break;
        }

        let wait = tokio::time::sleep(remaining);
        tokio::pin!(wait);
        tokio::select! {
            () = &mut wait => break,
            () = scheduler.queue().notified() => {}
        }

        // A higher-priority item anywhere in queue preempts this batch: the
        // batch collected so far must not be dispatched ahead of it.
        if matches!(scheduler.queue().peek_priority(), Some(p) if p < priority) {
            return true;
        }
        match scheduler.queue().pop() {
            Some(item) if item.priority == priority => batch.push(item),
            Some(item) if item.priority < priority => {
                // Raced with the peek above: a higher-priority item landed
                // and we popped it instead. Put it back and preempt.
                let _ = scheduler.queue().try_push(item);
                return true;
            }
            Some(item) => {
                // No more same-priority work is queued (the head is some
                // other priority, but not one that preempts us); push it
                // back untouched and end the batch.
                let _ = scheduler.queue().try_push(item);
                break;
            }
            None => break,
        }
    }
    false
}

async fn run_batch(worker: &Arc<dyn InferenceWorker>, batch: Vec<WorkItem>) {
    let waveforms: Vec<Vec<f32>> = batch.iter().map(|wi| wi.waveform.clone()).collect();
    let sample_rates: Vec<u32> = batch.iter().map(|wi| wi.sample_rate).collect();
    let enqueue_times: Vec<Instant> = batch.iter().map(|wi| wi.enqueue_monotonic).collect();

    let worker = Arc::clone(worker);
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || worker.run_batch(&waveforms, &sample_rates)).await;

    let inference_duration = started.elapsed();

    match result {
        Ok(Ok(texts)) if texts.len() == batch.len() => {
            for ((item, text), enqueued) in batch.into_iter().zip(texts).zip(enqueue_times) {
                let work_result = WorkResult {
                    text,
                    inference_duration,
                    queue_wait: started.saturating_duration_since(enqueued),
                };
                let _ = item.result_sink.send(Ok(work_result));
            }
        }
        Ok(Ok(texts)) => {
            error!(
                expected = batch.len(),
                got = texts.len(),
                "worker returned mismatched batch size"
            );
            fail_all(batch, "worker returned mismatched batch size".to_string());
        }
        Ok(Err(message)) => {
            warn!(error = %message, batch_size = batch.len(), "inference batch failed");
            fail_all(batch, message);
        }
        Err(join_error) => {
            error!(error = %join_error, "inference worker task panicked");
            fail_all(batch, format!("worker task panicked: {join_error}"));
        }
    }
}

fn fail_all(batch: Vec<WorkItem>, message: String) {
    for item in batch {
        let _ = item.result_sink.send(Err(asrg_core::GatewayError::Inference(message.clone())));
    }
}
