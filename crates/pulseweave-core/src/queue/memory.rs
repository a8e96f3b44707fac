//! In-memory FIFO handoff between submit and the workers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::TaskId;

/// Unbounded FIFO of task ids.
///
/// Design:
/// - Holds `TaskId` only; the record lives in the task table.
/// - `pop` waits on a `Notify` with a deadline instead of sleep-and-scan.
/// - Every popped item is acknowledged exactly once: `QueueItem::ack`, or on
///   drop if the holder unwinds before getting there.
pub struct TaskQueue {
    ready: Mutex<VecDeque<TaskId>>,
    notify: Notify,
    /// Pushed but not yet acknowledged.
    unfinished: Arc<AtomicUsize>,
}

/// One dequeued id, owned by exactly one worker until acknowledged.
#[derive(Debug)]
#[must_use = "a dequeued item must be acknowledged"]
pub struct QueueItem {
    task_id: TaskId,
    unfinished: Arc<AtomicUsize>,
    acked: bool,
}

impl QueueItem {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Mark the item done.
    pub fn ack(mut self) {
        self.acked = true;
    }
}

impl Drop for QueueItem {
    fn drop(&mut self) {
        if !self.acked {
            tracing::warn!(task_id = %self.task_id, "queue item dropped without ack");
        }
        self.unfinished.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            unfinished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn push(&self, task_id: TaskId) {
        {
            let mut ready = self.ready.lock().await;
            ready.push_back(task_id);
            self.unfinished.fetch_add(1, Ordering::AcqRel);
        }
        // Notify outside the lock
        self.notify.notify_one();
    }

    /// Pop the oldest id, waiting at most `wait` for one to arrive.
    pub async fn pop(&self, wait: Duration) -> Option<QueueItem> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(task_id) = self.ready.lock().await.pop_front() {
                return Some(QueueItem {
                    task_id,
                    unfinished: Arc::clone(&self.unfinished),
                    acked: false,
                });
            }

            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    /// Ids waiting to be dequeued.
    pub async fn len(&self) -> usize {
        self.ready.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pushed items not yet acknowledged (waiting + in flight).
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::Acquire)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
