use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::engine::Monitor;
use crate::models::StatusSnapshot;

pub async fn get_status(State(monitor): State<Arc<Monitor>>) -> Json<StatusSnapshot> {
    Json(monitor.snapshot().await)
}

pub fn create_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .with_state(monitor)
}

pub async fn start_server(port: u16, monitor: Arc<Monitor>) -> Result<()> {
    let app = create_router(monitor);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status API on {}", addr))?;
    info!("Status API: http://localhost:{}/api/status", port);
    axum::serve(listener, app).await.context("Status API stopped")?;
    Ok(())
}
