//! Two-lane alert queue.
//!
//! Tasks being retried go into a retry lane that is always drained before the
//! normal lane. Within each lane order is FIFO, except that a requeued task is
//! placed at the very front. The queue has a single logical consumer; pushes
//! from any number of producers wake it when it is idle.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{AlertError, Result};
use crate::task::AlertTask;

#[derive(Debug, Default)]
struct Lanes {
    retry: VecDeque<AlertTask>,
    normal: VecDeque<AlertTask>,
    closed: bool,
}

/// Queue of pending notifications.
#[derive(Debug, Default)]
pub struct AlertQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
}

impl AlertQueue {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new task to the normal lane.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::QueueClosed` once the queue has been closed.
    pub fn push(&self, task: AlertTask) -> Result<()> {
        {
            let mut lanes = self.lanes.lock();
            if lanes.closed {
                return Err(AlertError::QueueClosed);
            }
            lanes.normal.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Puts a failed task back at the front of the retry lane.
    ///
    /// Accepted even after [`close`](Self::close) so a draining dispatcher can
    /// keep retrying what it already owns.
    pub fn push_retry(&self, task: AlertTask) {
        self.lanes.lock().retry.push_front(task);
        self.notify.notify_one();
    }

    /// Takes the next task without waiting.
    pub fn try_pop(&self) -> Option<AlertTask> {
        let mut lanes = self.lanes.lock();
        lanes.retry.pop_front().or_else(|| lanes.normal.pop_front())
    }

    /// Waits for the next task.
    ///
    /// Returns `None` once the queue is closed and empty. Cancel safe: a task
    /// is only removed when this future completes.
    pub async fn next(&self) -> Option<AlertTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    /// Stops accepting new tasks and wakes the consumer.
    pub fn close(&self) {
        self.lanes.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Accepts new tasks again after [`close`](Self::close).
    pub fn reopen(&self) {
        self.lanes.lock().closed = false;
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lanes.lock().closed
    }

    /// Removes and returns everything still queued, retry lane first.
    pub fn drain(&self) -> Vec<AlertTask> {
        let mut lanes = self.lanes.lock();
        let mut tasks: Vec<AlertTask> = lanes.retry.drain(..).collect();
        tasks.extend(lanes.normal.drain(..));
        tasks
    }

    /// Total queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.retry.len() + lanes.normal.len()
    }

    /// Tasks waiting in the retry lane.
    #[must_use]
    pub fn retry_len(&self) -> usize {
        self.lanes.lock().retry.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Task ids in dequeue order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<Uuid> {
        let lanes = self.lanes.lock();
        lanes
            .retry
            .iter()
            .chain(lanes.normal.iter())
            .map(|t| t.id)
            .collect()
    }
}
