//! Addon-facing stream lookup, watch redirect and player embeds

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    MediaItem, MediaKind, MediaRef, ProviderTag, StreamRecord, MAX_EPISODE_INDEX,
};
use crate::services::providers::superflix::{movie_player_path, series_player_path};
use crate::services::streams::StreamDescriptor;
use crate::AppState;

lazy_static! {
    static ref IMDB_ID: Regex = Regex::new(r"^tt\d+$").unwrap();
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Media reference parsed from an addon stream id
#[derive(Debug, Clone, PartialEq)]
pub enum StreamTarget {
    /// Catalog id with zero-indexed season/episode
    Catalog {
        id: i64,
        season: u32,
        episode: u32,
    },
    /// IMDB id with season/episode already converted to zero-indexed
    Imdb {
        imdb_id: String,
        season: u32,
        episode: u32,
    },
}

/// Parse `[<addon>:]<id>[.<season>.<episode>]` (zero-indexed) or
/// `tt<digits>[:<season>:<episode>]` (one-indexed). A trailing `.json` is
/// ignored.
pub fn parse_stream_id(raw: &str) -> Option<StreamTarget> {
    let raw = raw.strip_suffix(".json").unwrap_or(raw).trim();

    if raw.starts_with("tt") {
        let mut parts = raw.split(':');
        let imdb_id = parts.next()?.to_string();
        if !IMDB_ID.is_match(&imdb_id) {
            return None;
        }
        let one_indexed = |part: Option<&str>| -> Option<u32> {
            match part {
                None => Some(0),
                Some(p) => index_in_range(p.parse::<u32>().ok()?.saturating_sub(1)),
            }
        };
        let season = one_indexed(parts.next())?;
        let episode = one_indexed(parts.next())?;
        return Some(StreamTarget::Imdb {
            imdb_id,
            season,
            episode,
        });
    }

    let params = match raw.rsplit_once(':') {
        Some((_addon, params)) => params,
        None => raw,
    };

    let mut parts = params.split('.');
    let id = parts.next()?.parse::<i64>().ok()?;
    let zero_indexed = |part: Option<&str>| -> Option<u32> {
        match part {
            None => Some(0),
            Some(p) => index_in_range(p.parse::<u32>().ok()?),
        }
    };
    let season = zero_indexed(parts.next())?;
    let episode = zero_indexed(parts.next())?;

    Some(StreamTarget::Catalog {
        id,
        season,
        episode,
    })
}

fn index_in_range(index: u32) -> Option<u32> {
    (index <= MAX_EPISODE_INDEX).then_some(index)
}

#[derive(Serialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamDescriptor>,
}

fn describe(state: &AppState, records: &[StreamRecord]) -> StreamsResponse {
    let streams = records
        .iter()
        .map(|record| {
            let label = state
                .streams
                .registry()
                .get(record.provider)
                .map(|p| p.label())
                .unwrap_or_else(|| record.provider.as_str());
            StreamDescriptor::new(record, label, &state.config.addon_prefix)
        })
        .collect();
    StreamsResponse { streams }
}

/// GET /stream/:kind/:id - Streams for a movie or episode
pub async fn get_streams(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<StreamsResponse>, ApiError> {
    let kind = MediaKind::from_segment(&kind)
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Unknown content type"))?;
    let target =
        parse_stream_id(&id).ok_or_else(|| error(StatusCode::BAD_REQUEST, "Malformed stream id"))?;

    let (media, season, episode) = match target {
        StreamTarget::Catalog {
            id,
            season,
            episode,
        } => (
            state.catalog.get_media(MediaRef { kind, id }).await,
            season,
            episode,
        ),
        StreamTarget::Imdb {
            imdb_id,
            season,
            episode,
        } => (
            state.catalog.resolve_imdb(kind, &imdb_id).await,
            season,
            episode,
        ),
    };

    let media: MediaItem = match media {
        Ok(Some(media)) => media,
        Ok(None) => return Ok(Json(StreamsResponse { streams: Vec::new() })),
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "Media lookup failed");
            return Ok(Json(StreamsResponse { streams: Vec::new() }));
        }
    };

    let records = match kind {
        MediaKind::Movie => state.streams.movie_streams(&media).await,
        MediaKind::Series => state.streams.series_streams(&media, season, episode).await,
    }
    .map_err(|e| {
        tracing::error!("Failed to load streams: {}", e);
        error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    Ok(Json(describe(&state, &records)))
}

/// GET /watch/:id - Refresh a stream if needed and redirect to it
pub async fn watch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state
        .streams
        .stream_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to find stream: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Stream not found"))?;

    let media = state
        .catalog
        .get_media(record.media)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load media {}: {}", record.media, e);
            error(StatusCode::BAD_GATEWAY, "Media lookup failed")
        })?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Media not found"))?;

    let fresh = state
        .streams
        .ensure_fresh(record, &media)
        .await
        .map_err(|e| {
            tracing::error!("Failed to refresh stream: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Stream unavailable"))?;

    let location = match &state.config.proxy_url {
        Some(proxy) => format!("{}?url={}", proxy, urlencoding::encode(&fresh.access_url)),
        None => fresh.access_url,
    };

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn superflix_base(state: &AppState) -> Result<String, ApiError> {
    let provider = state
        .streams
        .registry()
        .get(ProviderTag::SuperflixApi)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Provider not registered"))?;
    let endpoint = provider
        .endpoint()
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Provider has no endpoint"))?;
    Ok(endpoint.current_url().await)
}

fn embed_page(src: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="referrer" content="no-referrer">
<style>html,body{{margin:0;height:100%;background:#000}}iframe{{border:0;width:100%;height:100%}}</style>
</head>
<body>
<iframe src="{}" allowfullscreen allow="autoplay; fullscreen"></iframe>
</body>
</html>"#,
        src
    ))
}

/// GET /stream/embed/movie/:imdb_id - Player page for a movie
pub async fn embed_movie(
    State(state): State<Arc<AppState>>,
    Path(imdb_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    if !IMDB_ID.is_match(&imdb_id) {
        return Err(error(StatusCode::BAD_REQUEST, "Invalid IMDB id"));
    }
    let base = superflix_base(&state).await?;
    Ok(embed_page(&format!("{}{}", base, movie_player_path(&imdb_id))))
}

/// GET /stream/embed/series/:id/:season/:episode - Player page for an episode.
/// Season and episode are one-indexed here.
pub async fn embed_series(
    State(state): State<Arc<AppState>>,
    Path((id, season, episode)): Path<(i64, u32, u32)>,
) -> Result<Html<String>, ApiError> {
    // One-indexed here
    let valid = |n: u32| index_in_range(n.saturating_sub(1)).is_some();
    if !valid(season) || !valid(episode) {
        return Err(error(StatusCode::BAD_REQUEST, "Season or episode out of range"));
    }
    let base = superflix_base(&state).await?;
    Ok(embed_page(&format!(
        "{}{}",
        base,
        series_player_path(id, season, episode)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_ids() {
        assert_eq!(
            parse_stream_id("cinestream:603.json"),
            Some(StreamTarget::Catalog {
                id: 603,
                season: 0,
                episode: 0
            })
        );
        assert_eq!(
            parse_stream_id("1399.2.5"),
            Some(StreamTarget::Catalog {
                id: 1399,
                season: 2,
                episode: 5
            })
        );
    }

    #[test]
    fn test_parse_imdb_ids_are_one_indexed() {
        assert_eq!(
            parse_stream_id("tt0944947:1:1.json"),
            Some(StreamTarget::Imdb {
                imdb_id: "tt0944947".to_string(),
                season: 0,
                episode: 0
            })
        );
        assert_eq!(
            parse_stream_id("tt0133093"),
            Some(StreamTarget::Imdb {
                imdb_id: "tt0133093".to_string(),
                season: 0,
                episode: 0
            })
        );
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert_eq!(parse_stream_id("cinestream:abc.json"), None);
        assert_eq!(parse_stream_id("603.x"), None);
        assert_eq!(parse_stream_id("ttabc"), None);
        assert_eq!(parse_stream_id("tt0944947:one:1"), None);
        assert_eq!(parse_stream_id(""), None);
    }

    #[test]
    fn test_out_of_range_season_episode_rejected() {
        assert_eq!(parse_stream_id("cinestream:1399.4294967295.0.json"), None);
        assert_eq!(parse_stream_id("1399.0.2147483647"), None);
        assert_eq!(parse_stream_id("tt0944947:4294967295:1"), None);

        // Largest index that still fits an INTEGER column when one-indexed
        assert_eq!(
            parse_stream_id("1399.2147483646.0"),
            Some(StreamTarget::Catalog {
                id: 1399,
                season: MAX_EPISODE_INDEX,
                episode: 0
            })
        );
        assert_eq!(
            parse_stream_id("tt0944947:2147483647:1"),
            Some(StreamTarget::Imdb {
                imdb_id: "tt0944947".to_string(),
                season: MAX_EPISODE_INDEX,
                episode: 0
            })
        );
    }

    #[test]
    fn test_embed_page_frames_source() {
        let Html(body) = embed_page("https://superflixapi.asia/filme/tt0133093");
        assert!(body.contains(r#"<iframe src="https://superflixapi.asia/filme/tt0133093""#));
    }
}
