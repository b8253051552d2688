pub mod handlers;
pub mod queries;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::scanner::provider::ProviderRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub providers: Arc<ProviderRegistry>,
}

pub fn router(pool: PgPool, providers: Arc<ProviderRegistry>) -> Router {
    let state = Arc::new(AppState { pool, providers });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/approvals", get(handlers::approvals_feed))
        .route("/api/v1/wallets", post(handlers::register_wallet))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    pool: PgPool,
    providers: Arc<ProviderRegistry>,
    host: &str,
    port: u16,
) -> eyre::Result<()> {
    let app = router(pool, providers);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
