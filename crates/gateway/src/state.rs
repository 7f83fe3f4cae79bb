use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::metrics::GatewayMetrics;
use crate::registry::SessionRegistry;
use bridge::BroadcastChannel;
use common::Environment;
use inference::Liveness;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub session_config: SessionConfig,
    pub environment: Environment,
    pub dispatcher: Arc<Dispatcher>,
    pub broadcast: Arc<dyn BroadcastChannel>,
    pub registry: Arc<SessionRegistry>,
    pub liveness: Arc<Liveness>,
    pub metrics: GatewayMetrics,
}

/// Point-in-time view of the pipeline for the health and status routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub active_sessions: usize,
    pub workers_alive: usize,
    pub workers_total: usize,
    pub environment: &'static str,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.workers_alive > 0
    }
}

impl AppState {
    /// Read-only; safe to call from any thread.
    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            queue_depth: self.dispatcher.queue_depth(),
            queue_capacity: self.dispatcher.queue_capacity(),
            active_sessions: self.registry.len(),
            workers_alive: self.liveness.alive(),
            workers_total: self.liveness.total(),
            environment: self.environment.as_str(),
        }
    }
}
