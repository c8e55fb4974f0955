mod handlers;
mod state;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::enrich::EnrichmentOrchestrator;
pub use state::AppState;

pub fn build_router(orchestrator: Arc<EnrichmentOrchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/location", get(handlers::location))
        .route("/api/descriptions", axum::routing::delete(handlers::delete_descriptions))
        .route("/api/nearest-town", get(handlers::nearest_town))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(orchestrator: Arc<EnrichmentOrchestrator>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(orchestrator);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("town atlas server listening on http://{}", addr);
    axum::serve(listener, app).await
}
