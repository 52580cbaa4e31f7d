//! HTTP endpoints for the conductor.
//!
//! Provides health checks, a status snapshot and Prometheus metrics.

pub mod health;
mod metrics;

use crate::server::Conductor;
use axum::{routing::get, Extension, Json, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(conductor: Arc<Conductor>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(conductor))
}

/// Players, awaited barrier and outstanding commands.
async fn status_handler(
    Extension(conductor): Extension<Arc<Conductor>>,
) -> Json<crate::server::ConductorStatus> {
    Json(conductor.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_conductor() -> Arc<Conductor> {
        Conductor::new(Config::default())
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, body) = get_body(build_router(test_conductor()), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["players"], 0);
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let conductor = test_conductor();
        conductor.shutdown();
        let (_, body) = get_body(build_router(conductor), "/health").await;
        assert!(body.contains("\"status\":\"shutting_down\""));
    }

    #[tokio::test]
    async fn status_endpoint_returns_snapshot() {
        let (status, body) = get_body(build_router(test_conductor()), "/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["players"].as_array().unwrap().is_empty());
        assert!(json["barrier"].is_null());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let (status, body) = get_body(build_router(test_conductor()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE testconductor_players_active gauge"));
        assert!(body.contains("testconductor_barriers_opened_total 0"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = get_body(build_router(test_conductor()), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
