use crate::dispatcher::Dispatcher;
use crate::metrics::GatewayMetrics;
use crate::registry::SessionRegistry;
use bridge::Subscription;
use std::sync::Arc;

/// Releases everything a session holds outside its own task.
///
/// Teardown runs on [`SessionGuard::close`] or on drop, whichever comes
/// first, and only once.
pub struct SessionGuard {
    session_id: String,
    subscription: Subscription,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
    metrics: GatewayMetrics,
    closed: bool,
}

impl SessionGuard {
    pub fn new(
        session_id: impl Into<String>,
        subscription: Subscription,
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<Dispatcher>,
        metrics: GatewayMetrics,
    ) -> Self {
        metrics.session_opened();
        Self {
            session_id: session_id.into(),
            subscription,
            registry,
            dispatcher,
            metrics,
            closed: false,
        }
    }

    pub fn subscription(&mut self) -> &mut Subscription {
        &mut self.subscription
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.subscription.unsubscribe();
        self.dispatcher.release(&self.session_id);
        if self.registry.unregister(&self.session_id) {
            self.metrics.session_closed();
        }
        tracing::info!(session_id = %self.session_id, "Session closed");
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close();
    }
}
