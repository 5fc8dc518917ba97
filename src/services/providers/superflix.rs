//! SuperflixAPI provider
//!
//! On-demand only. Resolution produces an embed URL on this server; the embed
//! page frames the provider's player at its current endpoint. Movies are
//! addressed by IMDB id, series by catalog id with one-indexed season and
//! episode.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CatalogProvider, ContentProvider, ProviderError, StreamProvider};
use crate::models::{Audio, ContentType, MediaItem, ProviderTag, Quality};
use crate::services::endpoint::{Endpoint, EndpointProfile};
use crate::services::tmdb::CatalogApi;

lazy_static! {
    static ref DOMAIN_PATTERN: Regex = Regex::new(r"(?i)(^|\.)superflix[a-z]*\.").unwrap();
}

pub const DEFAULT_URL: &str = "https://superflixapi.asia";

const MIRRORS: [&str; 4] = [
    "https://superflixapi.asia",
    "https://superflixapi.top",
    "https://superflixapi.dev",
    "https://superflixapi.shop",
];

pub fn endpoint_profile() -> EndpointProfile {
    EndpointProfile {
        provider: ProviderTag::SuperflixApi,
        default_url: DEFAULT_URL.to_string(),
        candidates: MIRRORS.iter().map(|m| m.to_string()).collect(),
        domain_pattern: DOMAIN_PATTERN.clone(),
        search_query: "superflixapi".to_string(),
    }
}

/// Player path for a movie on the provider's site
pub fn movie_player_path(imdb_id: &str) -> String {
    format!("/filme/{}", imdb_id)
}

/// Player path for an episode. Takes one-indexed season and episode.
pub fn series_player_path(series_id: i64, season: u32, episode: u32) -> String {
    format!("/serie/{}/{}/{}", series_id, season, episode)
}

pub struct SuperflixApi {
    catalog: Arc<dyn CatalogApi>,
    endpoint: Arc<Endpoint>,
    app_url: String,
}

impl SuperflixApi {
    pub fn new(catalog: Arc<dyn CatalogApi>, endpoint: Arc<Endpoint>, app_url: &str) -> Self {
        Self {
            catalog,
            endpoint,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }
}

impl CatalogProvider for SuperflixApi {}

#[async_trait]
impl StreamProvider for SuperflixApi {
    async fn resolve_movie_url(
        &self,
        media: &MediaItem,
        _audio: Audio,
        _quality: Quality,
    ) -> Result<Option<String>, ProviderError> {
        let Some(imdb_id) = self.catalog.imdb_id(ContentType::Movie, media.id).await? else {
            warn!(movie_id = media.id, "No IMDB id for movie");
            return Ok(None);
        };

        let url = format!("{}/stream/embed/movie/{}", self.app_url, imdb_id);
        debug!(movie_id = media.id, url = %url, "Built movie embed URL");
        Ok(Some(url))
    }

    async fn resolve_series_url(
        &self,
        media: &MediaItem,
        season: u32,
        episode: u32,
        _audio: Audio,
    ) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/stream/embed/series/{}/{}/{}",
            self.app_url,
            media.id,
            u64::from(season) + 1,
            u64::from(episode) + 1
        );
        debug!(series_id = media.id, season, episode, url = %url, "Built episode embed URL");
        Ok(Some(url))
    }
}

impl ContentProvider for SuperflixApi {
    fn tag(&self) -> ProviderTag {
        ProviderTag::SuperflixApi
    }

    fn label(&self) -> &'static str {
        "SuperflixAPI"
    }

    fn endpoint(&self) -> Option<&Arc<Endpoint>> {
        Some(&self.endpoint)
    }
}
