//! Upstream catalog API client (TMDB v3)
//!
//! Bearer-token auth, localized responses, absolute image URLs and ratings
//! rounded to one decimal. Detail and external-id lookups are cached.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::cache::{CacheStats, TtlCache};
use crate::models::{CatalogEntry, ContentType, Genre, MediaDetails, TrendingCategory};

const MAX_RETRIES: u32 = 3;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Failure talking to the upstream catalog
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API key rejected")]
    Unauthorized,
}

/// Operations the rest of the server needs from the upstream catalog
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Check that the configured key is accepted
    async fn validate_key(&self) -> Result<(), CatalogError>;

    async fn genres(&self, content: ContentType) -> Result<Vec<Genre>, CatalogError>;

    async fn search(
        &self,
        content: ContentType,
        query: &str,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// One page of a listing category
    async fn discover(
        &self,
        content: ContentType,
        category: TrendingCategory,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// `None` when the upstream has no such title
    async fn details(
        &self,
        content: ContentType,
        id: i64,
    ) -> Result<Option<MediaDetails>, CatalogError>;

    async fn imdb_id(&self, content: ContentType, id: i64) -> Result<Option<String>, CatalogError>;

    async fn find_by_imdb(
        &self,
        content: ContentType,
        imdb_id: &str,
    ) -> Result<Option<i64>, CatalogError>;
}

// ============================================================================
// Upstream response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    results: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    id: i64,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    backdrop_path: Option<String>,
    poster_path: Option<String>,
    vote_average: Option<f64>,
    popularity: Option<f64>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    genre_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    id: i64,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    backdrop_path: Option<String>,
    poster_path: Option<String>,
    vote_average: Option<f64>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    genres: Vec<GenreItem>,
}

#[derive(Debug, Deserialize)]
struct GenreItem {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    #[serde(default)]
    genres: Vec<GenreItem>,
}

#[derive(Debug, Deserialize)]
struct ExternalIdsResponse {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FindItem>,
    #[serde(default)]
    tv_results: Vec<FindItem>,
}

#[derive(Debug, Deserialize)]
struct FindItem {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    success: bool,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct TmdbSettings {
    pub api_url: String,
    pub image_url: String,
    pub language: String,
    pub token: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_max_entries: Option<usize>,
}

pub struct TmdbClient {
    http: Client,
    settings: TmdbSettings,
    details_cache: TtlCache<(ContentType, i64), Option<MediaDetails>>,
    imdb_cache: TtlCache<(ContentType, i64), Option<String>>,
    genre_cache: TtlCache<ContentType, Vec<Genre>>,
}

impl TmdbClient {
    pub fn new(settings: TmdbSettings) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .gzip(true)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http,
            details_cache: TtlCache::new(settings.cache_ttl, settings.cache_max_entries),
            imdb_cache: TtlCache::new(settings.cache_ttl, settings.cache_max_entries),
            genre_cache: TtlCache::new(settings.cache_ttl, None),
            settings,
        })
    }

    /// GET a path with 429 backoff. A 404 is `Ok(None)`.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, CatalogError> {
        let url = format!("{}{}", self.settings.api_url.trim_end_matches('/'), path);
        let mut attempt = 0u32;

        loop {
            debug!(path = %path, "Catalog API request");

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.settings.token)
                .query(&[("language", self.settings.language.as_str())])
                .query(params)
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok());
                let wait = backoff_ms(retry_after, attempt);
                attempt += 1;
                warn!(path = %path, retry = attempt, wait_ms = wait, "Catalog API rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(wait)).await;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status == StatusCode::UNAUTHORIZED {
                return Err(CatalogError::Unauthorized);
            }
            if !status.is_success() {
                return Err(CatalogError::Http(status.as_u16()));
            }

            let text = response
                .text()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            return serde_json::from_str(&text).map(Some).map_err(|e| {
                error!(path = %path, error = %e, "Failed to parse catalog response");
                CatalogError::Parse(e.to_string())
            });
        }
    }

    fn image(&self, path: Option<String>) -> Option<String> {
        let path = path.filter(|p| !p.is_empty())?;
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path);
        }
        Some(format!(
            "{}/{}",
            self.settings.image_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }

    fn entry(&self, item: ListItem) -> CatalogEntry {
        CatalogEntry {
            id: item.id,
            title: item.title.or(item.name).unwrap_or_default(),
            overview: item.overview.unwrap_or_default(),
            backdrop: self.image(item.backdrop_path),
            poster: self.image(item.poster_path),
            rating: round_rating(item.vote_average.unwrap_or(0.0)),
            popularity: item.popularity.unwrap_or(0.0),
            release_date: item
                .release_date
                .or(item.first_air_date)
                .filter(|d| !d.is_empty()),
            genre_ids: item.genre_ids,
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let details = self.details_cache.stats().await;
        let imdb = self.imdb_cache.stats().await;
        CacheStats {
            entries: details.entries + imdb.entries,
            hits: details.hits + imdb.hits,
            misses: details.misses + imdb.misses,
        }
    }

    /// Drop expired cache entries
    pub async fn sweep(&self) -> usize {
        self.details_cache.sweep().await
            + self.imdb_cache.sweep().await
            + self.genre_cache.sweep().await
    }
}

/// Query parameters for a listing category
fn discover_params(category: TrendingCategory, page: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![("page", page.to_string())];
    match category {
        TrendingCategory::All | TrendingCategory::Popular => {
            params.push(("sort_by", "popularity.desc".to_string()));
        }
        TrendingCategory::TopRated => {
            params.push(("sort_by", "vote_average.desc".to_string()));
            params.push(("vote_count.gte", "200".to_string()));
        }
        TrendingCategory::Theater => {
            params.push(("sort_by", "popularity.desc".to_string()));
            params.push(("with_release_type", "2|3".to_string()));
        }
    }
    params
}

fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn validate_key(&self) -> Result<(), CatalogError> {
        let response: Option<AuthResponse> = self.get("/authentication", &[]).await?;
        match response {
            Some(auth) if auth.success => Ok(()),
            _ => Err(CatalogError::Unauthorized),
        }
    }

    async fn genres(&self, content: ContentType) -> Result<Vec<Genre>, CatalogError> {
        if let Some(genres) = self.genre_cache.get(&content).await {
            return Ok(genres);
        }

        let response: Option<GenreListResponse> = self
            .get(&format!("/genre/{}/list", content.path()), &[])
            .await?;
        let genres: Vec<Genre> = response
            .map(|r| r.genres)
            .unwrap_or_default()
            .into_iter()
            .map(|g| Genre {
                id: g.id,
                name: g.name,
            })
            .collect();

        self.genre_cache.insert(content, genres.clone()).await;
        Ok(genres)
    }

    async fn search(
        &self,
        content: ContentType,
        query: &str,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let response: Option<PageResponse> = self
            .get(
                &format!("/search/{}", content.path()),
                &[("query", query.to_string()), ("page", page.to_string())],
            )
            .await?;

        Ok(response
            .map(|r| r.results)
            .unwrap_or_default()
            .into_iter()
            .map(|item| self.entry(item))
            .collect())
    }

    async fn discover(
        &self,
        content: ContentType,
        category: TrendingCategory,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let response: Option<PageResponse> = self
            .get(
                &format!("/discover/{}", content.path()),
                &discover_params(category, page),
            )
            .await?;

        Ok(response
            .map(|r| r.results)
            .unwrap_or_default()
            .into_iter()
            .map(|item| self.entry(item))
            .collect())
    }

    async fn details(
        &self,
        content: ContentType,
        id: i64,
    ) -> Result<Option<MediaDetails>, CatalogError> {
        if let Some(cached) = self.details_cache.get(&(content, id)).await {
            return Ok(cached);
        }

        let response: Option<DetailResponse> = self
            .get(&format!("/{}/{}", content.path(), id), &[])
            .await?;

        let details = response.map(|d| MediaDetails {
            id: d.id,
            title: d.title.or(d.name).unwrap_or_default(),
            overview: d.overview.unwrap_or_default(),
            backdrop: self.image(d.backdrop_path),
            poster: self.image(d.poster_path),
            rating: round_rating(d.vote_average.unwrap_or(0.0)),
            release_date: d.release_date.or(d.first_air_date).filter(|s| !s.is_empty()),
            genres: d
                .genres
                .into_iter()
                .map(|g| Genre {
                    id: g.id,
                    name: g.name,
                })
                .collect(),
        });

        self.details_cache.insert((content, id), details.clone()).await;
        Ok(details)
    }

    async fn imdb_id(&self, content: ContentType, id: i64) -> Result<Option<String>, CatalogError> {
        if let Some(cached) = self.imdb_cache.get(&(content, id)).await {
            return Ok(cached);
        }

        let response: Option<ExternalIdsResponse> = self
            .get(&format!("/{}/{}/external_ids", content.path(), id), &[])
            .await?;
        let imdb_id = response
            .and_then(|r| r.imdb_id)
            .filter(|imdb| !imdb.is_empty());

        self.imdb_cache.insert((content, id), imdb_id.clone()).await;
        Ok(imdb_id)
    }

    async fn find_by_imdb(
        &self,
        content: ContentType,
        imdb_id: &str,
    ) -> Result<Option<i64>, CatalogError> {
        let response: Option<FindResponse> = self
            .get(
                &format!("/find/{}", imdb_id),
                &[("external_source", "imdb_id".to_string())],
            )
            .await?;

        Ok(response.and_then(|r| {
            let results = match content {
                ContentType::Movie => r.movie_results,
                ContentType::Tv => r.tv_results,
            };
            results.first().map(|item| item.id)
        }))
    }
}

/// Wait before retrying a 429: the server's `Retry-After` seconds when
/// given, else exponential from 500ms. Never longer than `MAX_BACKOFF_MS`.
fn backoff_ms(retry_after: Option<&str>, attempt: u32) -> u64 {
    let wait = match retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(secs) => secs.saturating_mul(1000),
        None => 1u64
            .checked_shl(attempt)
            .unwrap_or(u64::MAX)
            .saturating_mul(500),
    };
    wait.min(MAX_BACKOFF_MS)
}
