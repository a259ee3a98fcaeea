//! Bounded priority queue backing the scheduler.
//!
//! `asyncio.PriorityQueue` in the original implementation ordered entries by
//! `(priority, enqueue_monotonic, seq)`; `std::collections::BinaryHeap` is a
//! max-heap, so [`QueueEntry`]'s `Ord` is reversed to recover min-heap
//! (lowest priority value, then earliest enqueue, first out) behavior.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Instant;

use asrg_core::{Priority, WorkItem};
use tokio::sync::Notify;

pub(crate) struct QueueEntry {
    priority: Priority,
    enqueue_monotonic: Instant,
    seq: u64,
    item: WorkItem,
}

impl QueueEntry {
    const fn sort_key(&self) -> (Priority, Instant, u64) {
        (self.priority, self.enqueue_monotonic, self.seq)
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Thread-safe bounded priority queue. `push`/`pop` are synchronous; callers
/// that need to block until an item is available use [`PriorityQueue::notified`]
/// alongside [`PriorityQueue::pop`].
pub(crate) struct PriorityQueue {
    heap: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    maxsize: usize,
    notify: Notify,
}

impl PriorityQueue {
    pub(crate) fn new(maxsize: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(maxsize.min(1024))),
            maxsize,
            notify: Notify::new(),
        }
    }

    /// Push an item, failing if the queue is already at capacity.
    pub(crate) fn try_push(&self, item: WorkItem) -> Result<(), WorkItem> {
        let mut heap = self.heap.lock().expect("queue mutex poisoned");
        if self.maxsize > 0 && heap.len() >= self.maxsize {
            return Err(item);
        }
        heap.push(Reverse(QueueEntry {
            priority: item.priority,
            enqueue_monotonic: item.enqueue_monotonic,
            seq: item.seq,
            item,
        }));
        drop(heap);
        // `notify_one`, not `notify_waiters`: the aggregator is the sole
        // consumer, and `notify_one` stores a permit for a future waiter
        // when nothing is currently blocked in `notified()`, which avoids
        // the lost-wakeup race a push arriving between our `pop` miss and
        // our `notified().await` would otherwise hit.
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the lowest-priority, earliest-enqueued item, if any.
    pub(crate) fn pop(&self) -> Option<WorkItem> {
        self.heap
            .lock()
            .expect("queue mutex poisoned")
            .pop()
            .map(|Reverse(entry)| entry.item)
    }

    /// Peek at the priority of the head item without removing it.
    pub(crate) fn peek_priority(&self) -> Option<Priority> {
        self.heap
            .lock()
            .expect("queue mutex poisoned")
            .peek()
            .map(|Reverse(entry)| entry.priority)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.lock().expect("queue mutex poisoned").len()
    }

    /// Await a notification that the queue state changed (push occurred).
    /// Spurious wakeups are possible; callers must re-check after waking.
    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asrg_core::Priority;
    use tokio::sync::oneshot;

    fn item(priority: Priority, seq: u64, t: Instant) -> WorkItem {
        let (tx, _rx) = oneshot::channel();
        WorkItem {
            priority,
            seq,
            enqueue_monotonic: t,
            waveform: vec![],
            sample_rate: 16_000,
            result_sink: tx,
        }
    }

    #[test]
    fn final_sorts_before_partial_regardless_of_enqueue_order() {
        let q = PriorityQueue::new(0);
        let now = Instant::now();
        q.try_push(item(Priority::Partial, 0, now)).unwrap();
        q.try_push(item(Priority::Final, 1, now + std::time::Duration::from_millis(1)))
            .unwrap();
        let first = q.pop().unwrap();
        assert_eq!(first.priority, Priority::Final);
    }

    #[test]
    fn same_priority_is_fifo() {
        let q = PriorityQueue::new(0);
        let now = Instant::now();
        q.try_push(item(Priority::Partial, 0, now)).unwrap();
        q.try_push(item(Priority::Partial, 1, now + std::time::Duration::from_millis(1)))
            .unwrap();
        assert_eq!(q.pop().unwrap().seq, 0);
        assert_eq!(q.pop().unwrap().seq, 1);
    }

    #[test]
    fn rejects_push_past_capacity() {
        let q = PriorityQueue::new(1);
        q.try_push(item(Priority::Partial, 0, Instant::now())).unwrap();
        assert!(q.try_push(item(Priority::Partial, 1, Instant::now())).is_err());
    }
}
