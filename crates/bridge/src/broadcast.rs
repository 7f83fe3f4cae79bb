use crate::types::DetectionResult;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Publish/subscribe fan-out of results keyed by session id.
///
/// Delivery is best-effort: a publish with no live subscriber is dropped,
/// never buffered.
pub trait BroadcastChannel: Send + Sync {
    /// Returns the number of subscribers the result reached.
    fn publish(&self, key: &str, result: DetectionResult) -> usize;

    fn subscribe(&self, key: &str) -> Subscription;
}

type Release = Box<dyn FnOnce() + Send>;

/// Live subscription to one key.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) releases the
/// subscription; both are safe to repeat.
pub struct Subscription {
    key: String,
    rx: Option<broadcast::Receiver<DetectionResult>>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        key: impl Into<String>,
        rx: broadcast::Receiver<DetectionResult>,
        release: Option<Release>,
    ) -> Self {
        Self {
            key: key.into(),
            rx: Some(rx),
            release,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Wait for the next result. `None` once unsubscribed or the channel is gone.
    ///
    /// A lagging subscriber skips what it missed; those results would be
    /// stale by the time they were read anyway.
    pub async fn recv(&mut self) -> Option<DetectionResult> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(result) => return Some(result),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(key = %self.key, skipped, "Subscriber lagged, skipping results");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<DetectionResult> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(result) => return Some(result),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        // Receiver goes first so the release hook sees the updated count
        self.rx.take();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// In-process [`BroadcastChannel`] with one tokio broadcast channel per key.
///
/// A key's channel exists only while it has at least one subscriber.
#[derive(Clone)]
pub struct MemoryBroadcast {
    channels: Arc<DashMap<String, broadcast::Sender<DetectionResult>>>,
    capacity: usize,
}

impl MemoryBroadcast {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn active_keys(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.channels
            .get(key)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl BroadcastChannel for MemoryBroadcast {
    fn publish(&self, key: &str, result: DetectionResult) -> usize {
        match self.channels.get(key) {
            Some(tx) => tx.send(result).unwrap_or(0),
            None => {
                tracing::trace!(key, sequence = result.sequence, "No subscriber, result dropped");
                0
            }
        }
    }

    fn subscribe(&self, key: &str) -> Subscription {
        let rx = self
            .channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let channels = Arc::downgrade(&self.channels);
        let owned_key = key.to_string();
        let release: Release = Box::new(move || {
            if let Some(channels) = channels.upgrade() {
                channels.remove_if(&owned_key, |_, tx| tx.receiver_count() == 0);
            }
        });

        Subscription::new(key, rx, Some(release))
    }
}
