use crate::errors::QueueUnavailable;
use crate::types::FrameJob;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Shared multi-consumer work queue between sessions and workers.
///
/// Callers assume at-least-once delivery and no ordering across sessions.
pub trait JobQueue: Send + Sync {
    /// Non-blocking submission.
    fn enqueue(&self, job: FrameJob) -> Result<(), QueueUnavailable>;

    /// Block for at most `timeout` waiting for the next job.
    fn dequeue(&self, timeout: Duration) -> Option<FrameJob>;

    fn depth(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Reject further submissions and wake every blocked consumer.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

struct QueueState {
    jobs: VecDeque<FrameJob>,
    closed: bool,
}

/// Bounded in-process [`JobQueue`].
///
/// Each job is handed to exactly one consumer.
pub struct MemoryJobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl MemoryJobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: FrameJob) -> Result<(), QueueUnavailable> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueUnavailable::Closed);
            }
            if state.jobs.len() >= self.capacity {
                return Err(QueueUnavailable::Full {
                    capacity: self.capacity,
                });
            }
            state.jobs.push_back(job);
        }
        self.available.notify_one();
        Ok(())
    }

    fn dequeue(&self, timeout: Duration) -> Option<FrameJob> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.jobs.pop_front();
            }
        }
    }

    fn depth(&self) -> usize {
        self.state.lock().jobs.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
