use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;

#[tracing::instrument(level = "debug", skip_all)]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/updates", post(routes::updates::inbound_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tally server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
