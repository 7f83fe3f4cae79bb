use crate::{config::ServerConfig, routes::api_routes, state::AppState};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: AppState, config: &ServerConfig) -> anyhow::Result<Self> {
        let router = Router::new()
            .merge(api_routes())
            .with_state(state)
            .layer(CorsLayer::permissive());

        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves, then let open requests finish.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        tracing::info!("Starting gateway on {}", self.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
