//! Provider endpoint discovery
//!
//! Provider sites move between domains. Each provider owns an `Endpoint`
//! holding its current base URL; the `EndpointResolver` revalidates it by
//! running an ordered list of strategies and taking the first success:
//!
//! 1. liveness probe of the current URL
//! 2. centralized override document
//! 3. static candidate list
//! 4. primary search engine
//! 5. secondary search engine
//!
//! When every strategy fails the current URL is kept and the provider runs
//! degraded.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::http::HttpFetch;
use super::provider_urls::ProviderUrls;
use crate::metrics::ENDPOINT_RESOLUTIONS;
use crate::models::ProviderTag;

lazy_static! {
    static ref LINK_SELECTOR: Selector = Selector::parse("a[href]").unwrap();
}

/// Default search endpoints. `{query}` is replaced with the encoded query.
pub const PRIMARY_SEARCH_URL: &str = "https://html.duckduckgo.com/html/?q={query}";
pub const SECONDARY_SEARCH_URL: &str = "https://www.bing.com/search?q={query}";

// ============================================================================
// State
// ============================================================================

/// How the current URL was last established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscoverySource {
    Default,
    Liveness,
    Override,
    Static,
    PrimarySearch,
    SecondarySearch,
}

impl std::fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoverySource::Default => write!(f, "default"),
            DiscoverySource::Liveness => write!(f, "liveness"),
            DiscoverySource::Override => write!(f, "override"),
            DiscoverySource::Static => write!(f, "static"),
            DiscoverySource::PrimarySearch => write!(f, "primary_search"),
            DiscoverySource::SecondarySearch => write!(f, "secondary_search"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointState {
    pub current_url: String,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub discovery_source: DiscoverySource,
}

/// Fixed discovery inputs for one provider
#[derive(Debug, Clone)]
pub struct EndpointProfile {
    pub provider: ProviderTag,
    pub default_url: String,
    /// Known mirrors, probed in order
    pub candidates: Vec<String>,
    /// Matched against candidate hostnames from search results
    pub domain_pattern: Regex,
    pub search_query: String,
}

/// A provider's base URL and how it was found
pub struct Endpoint {
    profile: EndpointProfile,
    state: RwLock<EndpointState>,
}

impl Endpoint {
    pub fn new(profile: EndpointProfile) -> Self {
        let state = EndpointState {
            current_url: profile.default_url.trim_end_matches('/').to_string(),
            last_verified_at: None,
            discovery_source: DiscoverySource::Default,
        };

        Self {
            profile,
            state: RwLock::new(state),
        }
    }

    pub fn provider(&self) -> ProviderTag {
        self.profile.provider
    }

    pub fn profile(&self) -> &EndpointProfile {
        &self.profile
    }

    pub async fn current_url(&self) -> String {
        self.state.read().await.current_url.clone()
    }

    pub async fn state(&self) -> EndpointState {
        self.state.read().await.clone()
    }

    async fn update(&self, url: String, source: DiscoverySource) {
        let mut state = self.state.write().await;
        state.current_url = url;
        state.last_verified_at = Some(Utc::now());
        state.discovery_source = source;
    }
}

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStrategy {
    Liveness,
    Override,
    Static,
    PrimarySearch,
    SecondarySearch,
}

impl EndpointStrategy {
    pub const ORDER: [EndpointStrategy; 5] = [
        EndpointStrategy::Liveness,
        EndpointStrategy::Override,
        EndpointStrategy::Static,
        EndpointStrategy::PrimarySearch,
        EndpointStrategy::SecondarySearch,
    ];

    pub fn source(&self) -> DiscoverySource {
        match self {
            EndpointStrategy::Liveness => DiscoverySource::Liveness,
            EndpointStrategy::Override => DiscoverySource::Override,
            EndpointStrategy::Static => DiscoverySource::Static,
            EndpointStrategy::PrimarySearch => DiscoverySource::PrimarySearch,
            EndpointStrategy::SecondarySearch => DiscoverySource::SecondarySearch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Found(String),
    NotFound,
}

/// Search endpoint templates
#[derive(Debug, Clone)]
pub struct SearchEngines {
    pub primary: String,
    pub secondary: String,
}

impl Default for SearchEngines {
    fn default() -> Self {
        Self {
            primary: PRIMARY_SEARCH_URL.to_string(),
            secondary: SECONDARY_SEARCH_URL.to_string(),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct EndpointResolver {
    http: Arc<dyn HttpFetch>,
    overrides: Arc<ProviderUrls>,
    engines: SearchEngines,
    probe_timeout: Duration,
    fetch_timeout: Duration,
    strategies: Vec<EndpointStrategy>,
}

impl EndpointResolver {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        overrides: Arc<ProviderUrls>,
        probe_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            http,
            overrides,
            engines: SearchEngines::default(),
            probe_timeout,
            fetch_timeout,
            strategies: EndpointStrategy::ORDER.to_vec(),
        }
    }

    pub fn with_search_engines(mut self, engines: SearchEngines) -> Self {
        self.engines = engines;
        self
    }

    pub fn overrides(&self) -> &Arc<ProviderUrls> {
        &self.overrides
    }

    /// Run a single strategy against an endpoint
    pub async fn run(&self, strategy: EndpointStrategy, endpoint: &Endpoint) -> StrategyOutcome {
        let profile = endpoint.profile();

        match strategy {
            EndpointStrategy::Liveness => {
                self.probe_first(vec![endpoint.current_url().await]).await
            }
            EndpointStrategy::Override => {
                match self.overrides.get(&profile.provider.override_key()).await {
                    Some(url) => self.probe_first(vec![url]).await,
                    None => StrategyOutcome::NotFound,
                }
            }
            EndpointStrategy::Static => self.probe_first(profile.candidates.clone()).await,
            EndpointStrategy::PrimarySearch => self.search(&self.engines.primary, profile).await,
            EndpointStrategy::SecondarySearch => {
                self.search(&self.engines.secondary, profile).await
            }
        }
    }

    /// First strategy that finds a live URL wins
    pub async fn discover(&self, endpoint: &Endpoint) -> Option<(String, DiscoverySource)> {
        for strategy in &self.strategies {
            if let StrategyOutcome::Found(url) = self.run(*strategy, endpoint).await {
                return Some((url, strategy.source()));
            }
            debug!(provider = %endpoint.provider(), strategy = ?strategy, "Strategy found nothing");
        }
        None
    }

    /// Revalidate an endpoint, updating it in place on success
    pub async fn resolve(&self, endpoint: &Endpoint) -> EndpointState {
        let provider = endpoint.provider();

        match self.discover(endpoint).await {
            Some((url, source)) => {
                let previous = endpoint.current_url().await;
                if previous != url {
                    info!(provider = %provider, from = %previous, to = %url, source = %source, "Provider endpoint changed");
                } else {
                    debug!(provider = %provider, url = %url, source = %source, "Provider endpoint verified");
                }
                endpoint.update(url, source).await;
                ENDPOINT_RESOLUTIONS
                    .with_label_values(&[provider.as_str(), &source.to_string()])
                    .inc();
            }
            None => {
                let current = endpoint.current_url().await;
                warn!(
                    provider = %provider,
                    url = %current,
                    "No reachable endpoint found, keeping current URL"
                );
                ENDPOINT_RESOLUTIONS
                    .with_label_values(&[provider.as_str(), "unresolved"])
                    .inc();
            }
        }

        endpoint.state().await
    }

    async fn probe_first(&self, candidates: Vec<String>) -> StrategyOutcome {
        for candidate in candidates {
            let candidate = candidate.trim_end_matches('/').to_string();
            if candidate.is_empty() {
                continue;
            }
            if self.http.probe(&candidate, self.probe_timeout).await {
                return StrategyOutcome::Found(candidate);
            }
        }
        StrategyOutcome::NotFound
    }

    async fn search(&self, template: &str, profile: &EndpointProfile) -> StrategyOutcome {
        let url = template.replace("{query}", &urlencoding::encode(&profile.search_query));

        let html = match self.http.get_text(&url, None, self.fetch_timeout).await {
            Ok(html) => html,
            Err(e) => {
                debug!(provider = %profile.provider, url = %url, error = %e, "Search request failed");
                return StrategyOutcome::NotFound;
            }
        };

        let Ok(page) = Url::parse(&url) else {
            return StrategyOutcome::NotFound;
        };
        let candidates = extract_candidates(&html, &page, &profile.domain_pattern);
        debug!(provider = %profile.provider, count = candidates.len(), "Search candidates extracted");
        self.probe_first(candidates).await
    }
}

// ============================================================================
// Search result parsing
// ============================================================================

/// Origins of result links whose host matches `pattern`, in encounter order.
/// Relative links resolve against `page`, the search result page they came from.
pub fn extract_candidates(html: &str, page: &Url, pattern: &Regex) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for link in document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(target) = link_target(href, page) else {
            continue;
        };
        let Some(host) = target.host_str() else {
            continue;
        };
        if !pattern.is_match(host) {
            continue;
        }

        let origin = target.origin().ascii_serialization();
        if seen.insert(origin.clone()) {
            candidates.push(origin);
        }
    }

    candidates
}

/// Resolve a result href, unwrapping search engine redirect links:
/// DuckDuckGo `/l/?uddg=<url>` and Bing `/ck/a?u=a1<base64url>`
fn link_target(href: &str, page: &Url) -> Option<Url> {
    let url = page.join(href).ok()?;

    if url.path().starts_with("/l/") {
        let (_, target) = url.query_pairs().find(|(k, _)| k == "uddg")?;
        return Url::parse(&target).ok();
    }
    if url.path() == "/ck/a" {
        let (_, target) = url.query_pairs().find(|(k, _)| k == "u")?;
        return decode_bing_target(&target);
    }

    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn decode_bing_target(value: &str) -> Option<Url> {
    let encoded = value.strip_prefix("a1").unwrap_or(value);
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    let target = Url::parse(std::str::from_utf8(&bytes).ok()?).ok()?;
    matches!(target.scheme(), "http" | "https").then_some(target)
}
