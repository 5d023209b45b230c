//! HTTP server for health and metrics endpoints

use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::metrics;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub scanned_block: i64,
    pub checkpoint_block: i64,
    pub polls_completed: u64,
    pub poll_errors: u64,
    pub registered: u64,
    pub updated: u64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        scanned_block: metrics::SCANNED_BLOCK.get(),
        checkpoint_block: metrics::CHECKPOINT_BLOCK.get(),
        polls_completed: metrics::POLLS_COMPLETED.get(),
        poll_errors: metrics::POLL_ERRORS.get(),
        registered: metrics::TRANSFERS_MIRRORED
            .with_label_values(&["register"])
            .get(),
        updated: metrics::TRANSFERS_MIRRORED
            .with_label_values(&["update"])
            .get(),
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe: ready once a poll has finished
async fn readiness() -> (StatusCode, &'static str) {
    if metrics::POLLS_COMPLETED.get() > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let (content_type, body) = match metrics::encode() {
        Ok(encoded) => encoded,
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    };

    match Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(axum::body::Body::from(body))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
}

/// Serve health and metrics on an already bound listener
pub async fn serve(listener: TcpListener) -> eyre::Result<()> {
    axum::serve(listener, router()).await?;
    Ok(())
}

/// Start the HTTP server for health and metrics
pub async fn start_server(bind_address: &str, port: u16) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Health server listening on {}", addr);
    info!("  /health  - Relay status (JSON)");
    info!("  /metrics - Prometheus metrics");

    serve(listener).await
}
