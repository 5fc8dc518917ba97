//! Catalog listing and detail endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::models::{MediaItem, MediaKind, MediaRef, TrendingCategory};
use crate::services::catalog::{ListQuery, MediaDetail};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn parse_kind(kind: &str) -> Result<MediaKind, ApiError> {
    MediaKind::from_segment(kind).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Unknown content type" })),
        )
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    /// Display name of the trending category, when one was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'static str>,
    pub items: Vec<MediaItem>,
    pub count: usize,
    pub skip: usize,
}

/// GET /catalog/:kind?trending=&query=&genre=&skip=&take=
pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let kind = parse_kind(&kind)?;

    let items = state.catalog.list(kind, &query).await.map_err(|e| {
        tracing::error!("Failed to list catalog: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Database error" })),
        )
    })?;

    Ok(Json(CatalogResponse {
        name: query
            .trending
            .as_deref()
            .and_then(TrendingCategory::parse)
            .map(|c| c.label()),
        count: items.len(),
        skip: query.skip.unwrap_or(0),
        items,
    }))
}

/// GET /catalog/:kind/:id - Detail, materialized on demand
pub async fn get_detail(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<MediaDetail>, ApiError> {
    let kind = parse_kind(&kind)?;

    let detail = state
        .catalog
        .detail(MediaRef { kind, id })
        .await
        .map_err(|e| {
            tracing::error!("Failed to load {} {}: {}", kind, id, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "Catalog lookup failed" })),
            )
        })?;

    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Not found" })),
        )),
    }
}
