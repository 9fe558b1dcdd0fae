//! HTTP surface: job submission, status, streaming and the synchronous run
//! endpoints.

mod handlers;
pub mod stream;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::jobs::JobManager;

pub use handlers::ApiError;
pub use stream::{StreamEvent, StreamGateway};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobManager>,
    pub streams: Arc<StreamGateway>,
}

impl AppState {
    pub fn new(jobs: Arc<JobManager>, streams: Arc<StreamGateway>) -> Self {
        Self { jobs, streams }
    }
}

/// Build the router with all routes and layers applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/commands", get(handlers::list_commands))
        .route("/submit", post(handlers::submit))
        .route("/status/{job_id}", get(handlers::status))
        .route("/stream/{job_id}", get(handlers::stream))
        .route("/jobs/{job_id}/cancel", post(handlers::cancel))
        .route("/api/v1/run", post(handlers::run))
        .route("/api/v1/oape-api-implement", get(handlers::api_implement))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("OAPE server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("OAPE server shutting down");
        })
        .await
}
