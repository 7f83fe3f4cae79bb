use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::metrics::GatewayMetrics;
use crate::registry::SessionRegistry;
use crate::server::HttpServer;
use crate::state::AppState;
use bridge::{MemoryBroadcast, MemoryJobQueue};
use inference::{InferenceEngine, WorkerContext, WorkerMetrics, WorkerPool};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::signal;

/// A fully wired gateway: HTTP server, shared queue and broadcast, and the
/// worker pool draining the queue.
pub struct App {
    server: HttpServer,
    pool: WorkerPool,
    state: AppState,
}

impl App {
    pub async fn build<E, F>(config: Config, engine_factory: F) -> anyhow::Result<Self>
    where
        E: InferenceEngine,
        F: Fn(usize) -> anyhow::Result<E> + Send + Sync + 'static,
    {
        let queue = Arc::new(MemoryJobQueue::new(config.queue.capacity));
        let broadcast = Arc::new(MemoryBroadcast::new(config.broadcast.capacity));

        let pool = WorkerPool::start(
            WorkerContext {
                queue: queue.clone(),
                broadcast: broadcast.clone(),
                config: config.worker.clone(),
                shutdown: Arc::new(AtomicBool::new(false)),
                metrics: WorkerMetrics::default(),
            },
            engine_factory,
        )?;

        let state = AppState {
            session_config: config.session.clone(),
            environment: config.environment,
            dispatcher: Arc::new(Dispatcher::new(queue)),
            broadcast,
            registry: Arc::new(SessionRegistry::new()),
            liveness: pool.liveness(),
            metrics: GatewayMetrics::default(),
        };

        let server = HttpServer::new(state.clone(), &config.server).await?;

        Ok(Self {
            server,
            pool,
            state,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until `shutdown` resolves, then stop the worker pool.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Self { server, pool, .. } = self;
        let served = server.run(shutdown).await;

        tracing::info!("Server stopped, draining workers");
        let mut pool = pool;
        tokio::task::spawn_blocking(move || pool.shutdown()).await?;

        served
    }
}

/// Run the gateway until Ctrl-C or SIGTERM.
pub async fn start_app<E, F>(config: Config, engine_factory: F) -> anyhow::Result<()>
where
    E: InferenceEngine,
    F: Fn(usize) -> anyhow::Result<E> + Send + Sync + 'static,
{
    let app = App::build(config, engine_factory).await?;
    app.run_until(async {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown.");
    })
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
