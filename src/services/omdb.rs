//! Secondary metadata API (OMDB)
//!
//! Used to enrich catalog detail responses with IMDB ratings and runtime.
//! Disabled when no key is configured. Every response is cached.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::{CacheStats, TtlCache};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OmdbError {
    #[error("OMDB is not configured")]
    Disabled,
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("OMDB error: {0}")]
    Api(String),
}

/// Title detail, trimmed to the fields the server exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmdbTitle {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: Option<String>,
    #[serde(rename = "Runtime", default)]
    pub runtime: Option<String>,
    #[serde(rename = "Genre", default)]
    pub genre: Option<String>,
    #[serde(rename = "Director", default)]
    pub director: Option<String>,
    #[serde(rename = "Actors", default)]
    pub actors: Option<String>,
    #[serde(rename = "Plot", default)]
    pub plot: Option<String>,
    #[serde(rename = "Awards", default)]
    pub awards: Option<String>,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes", default)]
    pub imdb_votes: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Error", default)]
    error: Option<String>,
}

pub struct OmdbClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    title_cache: TtlCache<String, OmdbTitle>,
}

impl OmdbClient {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        cache_ttl: Duration,
        cache_max_entries: Option<usize>,
    ) -> Result<Self, OmdbError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OmdbError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            title_cache: TtlCache::new(cache_ttl, cache_max_entries),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<String, OmdbError> {
        let key = self.api_key.as_deref().ok_or(OmdbError::Disabled)?;

        let response = self
            .http
            .get(format!("{}/", self.api_url))
            .query(&[("apikey", key)])
            .query(params)
            .send()
            .await
            .map_err(|e| OmdbError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OmdbError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| OmdbError::Network(e.to_string()))?;

        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|e| OmdbError::Parse(e.to_string()))?;
        if envelope.response != "True" {
            return Err(OmdbError::Api(
                envelope.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        Ok(text)
    }

    pub async fn by_imdb_id(&self, imdb_id: &str) -> Result<OmdbTitle, OmdbError> {
        self.title(format!("i:{}", imdb_id), &[("i", imdb_id), ("plot", "full")])
            .await
    }

    /// Exact title match, narrowed by release year when known
    pub async fn by_title(&self, title: &str, year: Option<i32>) -> Result<OmdbTitle, OmdbError> {
        let year = year.map(|y| y.to_string());
        let mut params = vec![("t", title), ("plot", "full")];
        if let Some(year) = year.as_deref() {
            params.push(("y", year));
        }
        self.title(
            format!("t:{}:{}", title.to_lowercase(), year.as_deref().unwrap_or("")),
            &params,
        )
        .await
    }

    async fn title(&self, cache_key: String, params: &[(&str, &str)]) -> Result<OmdbTitle, OmdbError> {
        if let Some(hit) = self.title_cache.get(&cache_key).await {
            return Ok(hit);
        }

        debug!(key = %cache_key, "OMDB lookup");
        let text = self.get(params).await?;
        let title: OmdbTitle = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Unexpected OMDB title shape");
            OmdbError::Parse(e.to_string())
        })?;

        self.title_cache.insert(cache_key, title.clone()).await;
        Ok(title)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.title_cache.stats().await
    }

    pub async fn sweep(&self) -> usize {
        self.title_cache.sweep().await
    }
}
