//! RedeCanais provider
//!
//! Scraping provider with a browsable catalog. Catalog map pages list every
//! title with a link to its page; series pages list episodes grouped under
//! season headings, one link per audio track. Site numbering starts at one.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::extract::{join_url, scrape_media_url};
use super::{CatalogProvider, ContentProvider, ProviderError, StreamProvider};
use crate::db::{materialize, MediaStore};
use crate::models::{
    Audio, ContentType, EpisodeGroup, EpisodeTrack, MediaItem, MediaKind, MediaRef, ProviderTag,
    Quality, RawCatalogItem,
};
use crate::services::catalog::item_from_details;
use crate::services::endpoint::{Endpoint, EndpointProfile, EndpointResolver};
use crate::services::http::{HttpError, HttpFetch};
use crate::services::tmdb::CatalogApi;

lazy_static! {
    static ref DOMAIN_PATTERN: Regex = Regex::new(r"(?i)(^|\.)redecanais[a-z]*\.").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse("a[href]").unwrap();
    static ref YEAR: Regex = Regex::new(r"\((\d{4})\)").unwrap();
    static ref AUDIO_SUFFIX: Regex =
        Regex::new(r"(?i)\s*[-–|]?\s*\b(dublado|legendado|nacional)\b.*$").unwrap();
    static ref SEASON: Regex =
        Regex::new(r"(?i)(?:(\d+)\s*ª?\s*temporada|temporada\s*(\d+))").unwrap();
    static ref EPISODE: Regex = Regex::new(r"(?i)epis[oó]dio\s*(\d+)").unwrap();
}

pub const DEFAULT_URL: &str = "https://redecanais.ps";

const MIRRORS: [&str; 4] = [
    "https://redecanais.ps",
    "https://redecanais.gs",
    "https://redecanais.ec",
    "https://redecanais.fm",
];

const MOVIE_INDEX_PATH: &str = "/mapafilmes.html";
const SERIES_INDEX_PATH: &str = "/mapa.html";
const SEARCH_PATH: &str = "/pesquisar/?p=";

pub fn endpoint_profile() -> EndpointProfile {
    EndpointProfile {
        provider: ProviderTag::RedeCanais,
        default_url: DEFAULT_URL.to_string(),
        candidates: MIRRORS.iter().map(|m| m.to_string()).collect(),
        domain_pattern: DOMAIN_PATTERN.clone(),
        search_query: "redecanais".to_string(),
    }
}

pub struct RedeCanais {
    http: Arc<dyn HttpFetch>,
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn MediaStore>,
    endpoint: Arc<Endpoint>,
    resolver: Option<Arc<EndpointResolver>>,
    timeout: Duration,
    /// Title pages discovered by catalog scraping or site search
    pages: RwLock<HashMap<(MediaRef, Audio), String>>,
}

impl RedeCanais {
    pub fn new(
        http: Arc<dyn HttpFetch>,
        catalog: Arc<dyn CatalogApi>,
        store: Arc<dyn MediaStore>,
        endpoint: Arc<Endpoint>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            catalog,
            store,
            endpoint,
            resolver: None,
            timeout,
            pages: RwLock::new(HashMap::new()),
        }
    }

    /// Re-resolve the endpoint when a request cannot reach the site
    pub fn with_resolver(mut self, resolver: Arc<EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// GET a site path or absolute URL. Returns the body and the final URL.
    async fn fetch(&self, path_or_url: &str) -> Result<(String, String), ProviderError> {
        let base = self.endpoint.current_url().await;
        let url = site_url(&base, path_or_url);

        match self.http.get_text(&url, Some(&base), self.timeout).await {
            Ok(html) => Ok((html, url)),
            Err(e @ (HttpError::Connect(_) | HttpError::Timeout)) => {
                let Some(resolver) = &self.resolver else {
                    return Err(e.into());
                };

                warn!(url = %url, error = %e, "RedeCanais unreachable, re-resolving endpoint");
                let state = resolver.resolve(&self.endpoint).await;
                if state.current_url == base {
                    return Err(e.into());
                }

                let retry = site_url(&state.current_url, path_or_url);
                let html = self
                    .http
                    .get_text(&retry, Some(&state.current_url), self.timeout)
                    .await?;
                Ok((html, retry))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Page for a title, from the index or by searching the site
    async fn locate_page(
        &self,
        media: &MediaItem,
        audio: Audio,
    ) -> Result<Option<String>, ProviderError> {
        let key = (media.media_ref(), audio);
        if let Some(page) = self.pages.read().await.get(&key) {
            return Ok(Some(page.clone()));
        }

        let path = format!("{}{}", SEARCH_PATH, urlencoding::encode(&media.title));
        let (html, url) = self.fetch(&path).await?;

        let wanted = normalize_title(&media.title);
        let found = parse_catalog(&html, &url, media.kind)
            .into_iter()
            .find(|item| {
                normalize_title(&item.title) == wanted
                    && (media.kind == MediaKind::Series || audio_of(&item.page_url) == audio)
            });

        match found {
            Some(item) => {
                debug!(media = %media.media_ref(), page = %item.page_url, "Located title page by search");
                self.pages.write().await.insert(key, item.page_url.clone());
                Ok(Some(item.page_url))
            }
            None => Ok(None),
        }
    }

    async fn scrape(&self, page: &str) -> Result<Option<String>, ProviderError> {
        let base = self.endpoint.current_url().await;
        let url = site_url(&base, page);
        Ok(scrape_media_url(self.http.as_ref(), &url, Some(&base), self.timeout).await?)
    }
}

#[async_trait]
impl CatalogProvider for RedeCanais {
    async fn fetch_catalog(&self) -> Result<Vec<RawCatalogItem>, ProviderError> {
        let mut items = Vec::new();

        for (kind, path) in [
            (MediaKind::Movie, MOVIE_INDEX_PATH),
            (MediaKind::Series, SERIES_INDEX_PATH),
        ] {
            let (html, url) = self.fetch(path).await?;
            let parsed = parse_catalog(&html, &url, kind);
            info!(kind = %kind, count = parsed.len(), "Scraped RedeCanais catalog");
            items.extend(parsed);
        }

        Ok(items)
    }

    async fn materialize_catalog(&self, items: &[RawCatalogItem]) -> Result<usize, ProviderError> {
        let mut stored = 0;

        for item in items {
            let content = ContentType::from(item.kind);
            let results = match self.catalog.search(content, &item.title, 1).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(title = %item.title, error = %e, "Catalog search failed, skipping title");
                    continue;
                }
            };

            let matched = results.iter().find(|entry| match item.year {
                Some(year) => entry
                    .release_date
                    .as_deref()
                    .is_some_and(|d| d.starts_with(&year.to_string())),
                None => true,
            });
            let Some(entry) = matched else {
                debug!(title = %item.title, "No catalog match for scraped title");
                continue;
            };

            let details = match self.catalog.details(content, entry.id).await {
                Ok(Some(details)) => details,
                Ok(None) => continue,
                Err(e) => {
                    warn!(title = %item.title, id = entry.id, error = %e, "Catalog details failed, skipping title");
                    continue;
                }
            };

            let media = item_from_details(item.kind, details);
            if let Err(e) = materialize(self.store.as_ref(), &media).await {
                warn!(title = %item.title, id = media.id, error = %e, "Failed to store scraped title");
                continue;
            }

            let audio = match item.kind {
                MediaKind::Movie => audio_of(&item.page_url),
                MediaKind::Series => Audio::Dubbed,
            };
            self.pages
                .write()
                .await
                .insert((media.media_ref(), audio), item.page_url.clone());
            stored += 1;
        }

        Ok(stored)
    }
}

#[async_trait]
impl StreamProvider for RedeCanais {
    async fn resolve_movie_url(
        &self,
        media: &MediaItem,
        audio: Audio,
        _quality: Quality,
    ) -> Result<Option<String>, ProviderError> {
        match self.locate_page(media, audio).await? {
            Some(page) => self.scrape(&page).await,
            None => Ok(None),
        }
    }

    async fn resolve_series_url(
        &self,
        media: &MediaItem,
        season: u32,
        episode: u32,
        audio: Audio,
    ) -> Result<Option<String>, ProviderError> {
        let groups = self.list_episodes(media).await?;

        let track = groups
            .iter()
            .find(|g| g.season == season && g.episode == episode)
            .and_then(|g| g.tracks.iter().find(|t| t.audio == audio));

        match track {
            Some(track) => self.scrape(&track.url).await,
            None => Ok(None),
        }
    }

    async fn list_episodes(&self, media: &MediaItem) -> Result<Vec<EpisodeGroup>, ProviderError> {
        let Some(page) = self.locate_page(media, Audio::Dubbed).await? else {
            return Ok(Vec::new());
        };

        let (html, url) = self.fetch(&page).await?;
        Ok(parse_episodes(&html, &url))
    }
}

impl ContentProvider for RedeCanais {
    fn tag(&self) -> ProviderTag {
        ProviderTag::RedeCanais
    }

    fn label(&self) -> &'static str {
        "RedeCanais"
    }

    fn endpoint(&self) -> Option<&Arc<Endpoint>> {
        Some(&self.endpoint)
    }
}

// ============================================================================
// Page parsing
// ============================================================================

fn site_url(base: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
        path_or_url.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path_or_url.trim_start_matches('/')
        )
    }
}

fn audio_of(text: &str) -> Audio {
    if text.to_lowercase().contains("legendado") {
        Audio::Subtitled
    } else {
        Audio::Dubbed
    }
}

/// Lowercase alphanumerics separated by single spaces
fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_title_link(path: &str, kind: MediaKind) -> bool {
    let path = path.to_lowercase();
    if !path.ends_with(".html") {
        return false;
    }
    match kind {
        MediaKind::Movie => path.contains("filme"),
        MediaKind::Series => path.contains("browse-") || path.contains("serie"),
    }
}

/// Title links from a catalog map or search result page
fn parse_catalog(html: &str, page_url: &str, kind: MediaKind) -> Vec<RawCatalogItem> {
    let document = Html::parse_document(html);
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();

    for link in document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !is_title_link(href, kind) {
            continue;
        }
        let Some(url) = join_url(page_url, href) else {
            continue;
        };

        let text: String = link.text().collect::<String>().trim().to_string();
        if text.is_empty() || !seen.insert(url.clone()) {
            continue;
        }

        let year = YEAR
            .captures(&text)
            .and_then(|caps| caps[1].parse::<i32>().ok());
        let title = AUDIO_SUFFIX.replace(&YEAR.replace_all(&text, ""), "").trim().to_string();
        if title.is_empty() {
            continue;
        }

        items.push(RawCatalogItem {
            kind,
            title,
            page_url: url,
            year,
        });
    }

    items
}

/// Episode listing of a series page. Returned numbering is zero-indexed.
fn parse_episodes(html: &str, page_url: &str) -> Vec<EpisodeGroup> {
    let document = Html::parse_document(html);
    let mut groups: Vec<EpisodeGroup> = Vec::new();
    let mut season: u32 = 0;
    let mut current: Option<(u32, String)> = None;

    for node in document.root_element().descendants() {
        match node.value() {
            Node::Text(text) => {
                // Anchor text is handled with its element
                let inside_link = node
                    .parent()
                    .and_then(ElementRef::wrap)
                    .is_some_and(|el| el.value().name() == "a");
                if inside_link {
                    continue;
                }

                if let Some(caps) = SEASON.captures(text) {
                    if let Some(n) = caps.get(1).or_else(|| caps.get(2)) {
                        season = n.as_str().parse::<u32>().unwrap_or(1).saturating_sub(1);
                        current = None;
                    }
                }
                if let Some(caps) = EPISODE.captures(text) {
                    let number = caps[1].parse::<u32>().unwrap_or(1).saturating_sub(1);
                    let title = text.trim().trim_end_matches([':', '-']).trim().to_string();
                    current = Some((number, title));
                }
            }
            Node::Element(el) if el.name() == "a" => {
                let Some(link) = ElementRef::wrap(node) else {
                    continue;
                };
                let Some(href) = el.attr("href") else {
                    continue;
                };
                let text: String = link.text().collect::<String>().trim().to_string();

                let (episode, title) = match EPISODE.captures(&text) {
                    Some(caps) => (
                        caps[1].parse::<u32>().unwrap_or(1).saturating_sub(1),
                        text.clone(),
                    ),
                    None => match &current {
                        Some((number, title)) => (*number, title.clone()),
                        None => continue,
                    },
                };
                let Some(url) = join_url(page_url, href) else {
                    continue;
                };

                let track = EpisodeTrack {
                    url,
                    audio: audio_of(&text),
                };
                match groups
                    .iter_mut()
                    .find(|g| g.season == season && g.episode == episode)
                {
                    Some(group) => {
                        if !group.tracks.iter().any(|t| t.audio == track.audio) {
                            group.tracks.push(track);
                        }
                    }
                    None => groups.push(EpisodeGroup {
                        title,
                        season,
                        episode,
                        tracks: vec![track],
                    }),
                }
            }
            _ => {}
        }
    }

    groups
}
