//! Health check endpoint.

use crate::server::Conductor;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `ok`, or `shutting_down` after shutdown.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Number of registered players.
    pub players: usize,
    /// Number of open connections.
    pub connections: usize,
    /// Name of the awaited barrier, if any.
    pub barrier: Option<String>,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(
    Extension(conductor): Extension<Arc<Conductor>>,
) -> Json<HealthStatus> {
    let status = conductor.status();
    let state = if conductor.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthStatus {
        status: state.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        players: status.players.len(),
        connections: status.connections,
        barrier: status.barrier.map(|b| b.name),
        uptime_seconds: conductor.uptime().as_secs(),
    })
}
