//! Admin/Management endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::repository::{media, streams};
use crate::models::MediaKind;
use crate::services::scheduler::{endpoint_states, refresh_endpoints, run_sync};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Query params for admin operations
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin key for authorization (simple protection)
    pub key: Option<String>,
    /// Also index provider catalogs (sync only)
    #[serde(default)]
    pub providers: bool,
}

/// Stats response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStatsResponse {
    pub movies: i64,
    pub series: i64,
    pub movie_streams: i64,
    pub series_streams: i64,
    pub trending_entries: usize,
}

/// Validate admin key
fn validate_admin_key(state: &AppState, provided_key: Option<&str>) -> Result<(), ApiError> {
    check_admin_key(state.config.admin_key.as_deref(), provided_key)
}

/// Without a configured key every admin request is refused
fn check_admin_key(configured: Option<&str>, provided: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = configured else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "Admin API disabled: ADMIN_KEY not set" })),
        ));
    };
    match provided {
        Some(key) if key == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing admin key" })),
        )),
    }
}

/// POST /api/admin/sync - Start a catalog sync pass in the background
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    if state.sync.is_running() {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Sync already running" })),
        ));
    }

    let sync = state.sync.clone();
    let index_providers = query.providers;
    tokio::spawn(async move {
        run_sync(&sync, index_providers).await;
    });

    tracing::info!(index_providers, "Admin: catalog sync started");

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "message": "Sync started"
        })),
    ))
}

/// POST /api/admin/endpoints/refresh - Revalidate every provider endpoint
pub async fn refresh_provider_endpoints(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    let endpoints = refresh_endpoints(&state.resolver, state.streams.registry()).await;
    tracing::info!("Admin: revalidated {} provider endpoints", endpoints.len());

    Ok(Json(serde_json::json!({ "endpoints": endpoints })))
}

/// GET /api/admin/endpoints - Current provider endpoints
pub async fn list_endpoints(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    let endpoints = endpoint_states(state.streams.registry()).await;
    Ok(Json(serde_json::json!({ "endpoints": endpoints })))
}

/// POST /api/admin/provider-urls/refresh - Reload the override document
pub async fn refresh_provider_urls(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    let overrides = state.resolver.overrides();
    let count = overrides.refresh().await.map_err(|e| {
        tracing::error!("Failed to refresh provider URLs: {}", e);
        (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": "Override document unavailable" })),
        )
    })?;

    tracing::info!("Admin: loaded {} provider URL overrides", count);

    Ok(Json(serde_json::json!({
        "success": true,
        "count": count,
        "urls": overrides.all().await
    })))
}

/// GET /api/admin/stats - Get database statistics
pub async fn get_db_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    let movies = media::count(&state.pool, MediaKind::Movie).await.map_err(|e| {
        tracing::error!("Failed to count movies: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Database error" })),
        )
    })?;

    let series = media::count(&state.pool, MediaKind::Series)
        .await
        .unwrap_or(0);
    let movie_streams = streams::count(&state.pool, MediaKind::Movie)
        .await
        .unwrap_or(0);
    let series_streams = streams::count(&state.pool, MediaKind::Series)
        .await
        .unwrap_or(0);

    Ok(Json(DbStatsResponse {
        movies,
        series,
        movie_streams,
        series_streams,
        trending_entries: state.sync.index().len().await,
    }))
}
