use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "IPTV Catalog",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Cache stats
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheStats {
    entries: usize,
    in_flight: usize,
    ttl_seconds: u64,
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    sources: usize,
    cache: CacheStats,
    fetch_timeout_ms: u64,
    max_playlist_size_mb: usize,
}

/// GET /health - Service health with cache stats
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.cache.stats().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        sources: state.sources.len().await,
        cache: CacheStats {
            entries: stats.entry_count,
            in_flight: stats.in_flight_count,
            ttl_seconds: stats.ttl.as_secs(),
        },
        fetch_timeout_ms: state.config.fetch_timeout_ms,
        max_playlist_size_mb: state.config.max_playlist_size_mb,
    })
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
