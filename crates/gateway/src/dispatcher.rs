use bridge::{FrameJob, JobQueue, QueueUnavailable};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Turns a session's frame into a queued job with a fresh sequence number.
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    counters: DashMap<String, Arc<AtomicU64>>,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            counters: DashMap::new(),
        }
    }

    /// Assign the next sequence for `session_id` and enqueue the job.
    ///
    /// Sequences start at 1. A rejected submission still consumes its
    /// sequence, leaving a gap.
    pub fn submit(&self, session_id: &str, payload: Bytes) -> Result<u64, QueueUnavailable> {
        let counter = self
            .counters
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        let sequence = counter.fetch_add(1, Ordering::AcqRel) + 1;

        self.queue
            .enqueue(FrameJob::new(session_id, sequence, payload))?;
        Ok(sequence)
    }

    /// Forget a disconnected session's counter.
    pub fn release(&self, session_id: &str) {
        self.counters.remove(session_id);
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }
}
