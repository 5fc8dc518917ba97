//! Endpoint override document
//!
//! A plain-text document at a configurable location maps provider keys to
//! their current base URL, one `key=url` pair per line. Overrides are the
//! operator's way to repoint a provider without a redeploy.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::http::{HttpError, HttpFetch};

lazy_static! {
    static ref OVERRIDE_LINE: Regex = Regex::new(r"(?i)^(\w+)=(https?://\S+)$").unwrap();
}

/// Parse `key=url` lines. Keys are lowercased, trailing slashes stripped,
/// malformed lines skipped.
pub fn parse_overrides(text: &str) -> HashMap<String, String> {
    let mut urls = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = OVERRIDE_LINE.captures(line) {
            let key = caps[1].to_lowercase();
            let url = caps[2].trim_end_matches('/').to_string();
            urls.insert(key, url);
        }
    }

    urls
}

/// Cached view of the override document
pub struct ProviderUrls {
    http: Arc<dyn HttpFetch>,
    source_url: String,
    timeout: Duration,
    urls: RwLock<HashMap<String, String>>,
    loaded: RwLock<bool>,
}

impl ProviderUrls {
    pub fn new(http: Arc<dyn HttpFetch>, source_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            source_url: source_url.to_string(),
            timeout,
            urls: RwLock::new(HashMap::new()),
            loaded: RwLock::new(false),
        }
    }

    /// Fetch the document and merge its entries into the cached map
    pub async fn fetch(&self) -> Result<usize, HttpError> {
        let text = self
            .http
            .get_text(&self.source_url, None, self.timeout)
            .await?;
        let parsed = parse_overrides(&text);
        let count = parsed.len();

        self.urls.write().await.extend(parsed);
        *self.loaded.write().await = true;

        info!(source = %self.source_url, entries = count, "Provider URL overrides loaded");
        Ok(count)
    }

    /// Drop cached entries and fetch again
    pub async fn refresh(&self) -> Result<usize, HttpError> {
        self.urls.write().await.clear();
        *self.loaded.write().await = false;
        self.fetch().await
    }

    /// Override for a provider key. Loads the document on first use.
    pub async fn get(&self, key: &str) -> Option<String> {
        if !*self.loaded.read().await {
            if let Err(e) = self.fetch().await {
                warn!(source = %self.source_url, error = %e, "Failed to load provider URL overrides");
            }
        }

        self.urls.read().await.get(&key.to_lowercase()).cloned()
    }

    pub async fn all(&self) -> HashMap<String, String> {
        self.urls.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHttp;

    #[test]
    fn test_parse_strips_trailing_slash() {
        let urls = parse_overrides("superflixapi=https://example.test/\n");
        assert_eq!(urls.get("superflixapi").map(String::as_str), Some("https://example.test"));
    }

    #[test]
    fn test_parse_lowercases_keys_and_skips_garbage() {
        let text = "RedeCanais=https://rc.test\n\
                    # comment line\n\
                    nourl=\n\
                    bad key=https://x.test\n\
                    ftp=ftp://files.test\n\
                    \n\
                    other=http://other.test/path/";
        let urls = parse_overrides(text);

        assert_eq!(urls.len(), 2);
        assert_eq!(urls["redecanais"], "https://rc.test");
        assert_eq!(urls["other"], "http://other.test/path");
    }

    #[tokio::test]
    async fn test_get_loads_lazily_and_refresh_replaces() {
        let http = Arc::new(FakeHttp::new());
        http.set_page("https://paste.test/raw", "superflixapi=https://one.test/");

        let overrides = ProviderUrls::new(http.clone(), "https://paste.test/raw", Duration::from_secs(1));
        assert_eq!(
            overrides.get("SUPERFLIXAPI").await.as_deref(),
            Some("https://one.test")
        );

        http.set_page("https://paste.test/raw", "redecanais=https://two.test");
        assert_eq!(overrides.refresh().await.unwrap(), 1);
        assert_eq!(overrides.get("superflixapi").await, None);
        assert_eq!(overrides.get("redecanais").await.as_deref(), Some("https://two.test"));
    }

    #[tokio::test]
    async fn test_unreachable_document_yields_no_override() {
        let http = Arc::new(FakeHttp::new());
        let overrides = ProviderUrls::new(http, "https://paste.test/raw", Duration::from_secs(1));
        assert_eq!(overrides.get("superflixapi").await, None);
    }
}
