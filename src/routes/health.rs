use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::db;
use crate::services::cache::CacheStats;
use crate::services::scheduler::{endpoint_states, ProviderEndpoint};
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "CineStream Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Metadata cache stats
#[derive(Serialize)]
struct CachesHealth {
    tmdb: CacheStats,
    omdb: CacheStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncHealth {
    running: bool,
    trending_entries: usize,
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    postgres: bool,
    providers: Vec<ProviderEndpoint>,
    caches: CachesHealth,
    sync: SyncHealth,
}

/// GET /health - Advanced health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    // PostgreSQL is critical
    let postgres_ok = db::health_check(&state.pool).await;

    let providers = endpoint_states(state.streams.registry()).await;
    let degraded = providers.iter().any(|p| p.state.last_verified_at.is_none());

    let status = if !postgres_ok {
        "unhealthy"
    } else if degraded {
        "degraded" // Some provider endpoint never verified
    } else {
        "ok"
    };

    let health = HealthResponse {
        status: status.to_string(),
        uptime,
        postgres: postgres_ok,
        providers,
        caches: CachesHealth {
            tmdb: state.tmdb.cache_stats().await,
            omdb: state.omdb.cache_stats().await,
        },
        sync: SyncHealth {
            running: state.sync.is_running(),
            trending_entries: state.sync.index().len().await,
        },
    };

    Json(health)
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Readiness probe (for Kubernetes)
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !db::health_check(&state.pool).await {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready - postgres unavailable");
    }
    if !state.streams.registry().is_initialized() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready - providers not registered");
    }
    (StatusCode::OK, "ready")
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
