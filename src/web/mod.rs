//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::live::{Broadcaster, Debouncer};
use crate::scheduler::Scheduler;
use crate::stats::SnapshotSource;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    pub broadcaster: Broadcaster,
    pub debouncer: Arc<Debouncer>,
    pub stats: Arc<dyn SnapshotSource>,
}

/// Web server for NanoStatus.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Start the server on the configured port and run until `shutdown`
    /// resolves. Open event streams are closed by shutting down the
    /// broadcaster afterwards.
    pub async fn start<F>(
        &self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = routes(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;

        tracing::info!("Web server stopped");
        Ok(())
    }
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route(
            "/api/monitors",
            get(handlers::handle_list_monitors).post(handlers::handle_create_monitor),
        )
        .route(
            "/api/monitors/{id}",
            get(handlers::handle_get_monitor)
                .put(handlers::handle_update_monitor)
                .delete(handlers::handle_delete_monitor),
        )
        .route("/api/monitors/{id}/history", get(handlers::handle_monitor_history))
        .route("/api/stats", get(handlers::handle_stats))
        .route("/api/events", get(handlers::handle_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}
