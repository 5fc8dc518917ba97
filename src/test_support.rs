//! In-memory fakes shared by unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::db::{MediaFilter, MediaStore, StoreError};
use crate::models::{
    Audio, CatalogEntry, ContentType, EpisodeGroup, Genre, MediaDetails, MediaItem, MediaKind,
    MediaRef, NewStream, ProviderTag, Quality, StreamKey, StreamRecord, TrendingCategory,
};
use crate::services::http::{HttpError, HttpFetch};
use crate::services::providers::{
    CatalogProvider, ContentProvider, ProviderError, StreamProvider,
};
use crate::services::tmdb::{CatalogApi, CatalogError};

pub fn media_item(kind: MediaKind, id: i64, title: &str) -> MediaItem {
    MediaItem {
        kind,
        id,
        title: title.to_string(),
        description: String::new(),
        thumbnail: String::new(),
        poster: String::new(),
        rating: 0.0,
        released_at: None,
        genres: Vec::new(),
    }
}

pub fn entry(id: i64, title: &str, release_date: Option<&str>, genre_ids: Vec<i64>) -> CatalogEntry {
    CatalogEntry {
        id,
        title: title.to_string(),
        overview: String::new(),
        backdrop: None,
        poster: None,
        rating: 7.0,
        popularity: 1.0,
        release_date: release_date.map(String::from),
        genre_ids,
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Serves registered pages; HEAD succeeds only for URLs marked live
#[derive(Default)]
pub struct FakeHttp {
    pages: Mutex<HashMap<String, String>>,
    live: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn set_live(&self, url: &str) {
        self.live
            .lock()
            .unwrap()
            .insert(url.trim_end_matches('/').to_string());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, HttpError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.live.lock().unwrap().contains(url.trim_end_matches('/')) {
            Ok(200)
        } else {
            Err(HttpError::Connect(url.to_string()))
        }
    }

    async fn get_text(
        &self,
        url: &str,
        _referer: Option<&str>,
        _timeout: Duration,
    ) -> Result<String, HttpError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(HttpError::Status(404))
    }
}

// ============================================================================
// Upstream catalog
// ============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    imdb: Mutex<HashMap<i64, String>>,
    details: Mutex<HashMap<(ContentType, i64), MediaDetails>>,
    search: Mutex<HashMap<(ContentType, String), Vec<CatalogEntry>>>,
    genres: Mutex<HashMap<ContentType, Vec<Genre>>>,
    pages: Mutex<HashMap<(ContentType, TrendingCategory, u32), Vec<CatalogEntry>>>,
    page_failures: Mutex<HashMap<u32, u32>>,
    failing_searches: Mutex<HashSet<String>>,
    failing_details: Mutex<HashSet<i64>>,
    discover_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    details_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_imdb(&self, id: i64, imdb_id: &str) {
        self.imdb.lock().unwrap().insert(id, imdb_id.to_string());
    }

    pub fn set_details(&self, content: ContentType, details: MediaDetails) {
        self.details
            .lock()
            .unwrap()
            .insert((content, details.id), details);
    }

    pub fn add_search_result(&self, content: ContentType, query: &str, result: CatalogEntry) {
        self.search
            .lock()
            .unwrap()
            .entry((content, query.to_string()))
            .or_default()
            .push(result);
    }

    pub fn set_genres(&self, content: ContentType, genres: Vec<Genre>) {
        self.genres.lock().unwrap().insert(content, genres);
    }

    pub fn set_page(
        &self,
        content: ContentType,
        category: TrendingCategory,
        page: u32,
        entries: Vec<CatalogEntry>,
    ) {
        self.pages
            .lock()
            .unwrap()
            .insert((content, category, page), entries);
    }

    /// Fail the first `times` movie POPULAR requests for `page`
    pub fn fail_page(&self, page: u32, times: u32) {
        self.page_failures.lock().unwrap().insert(page, times);
    }

    /// Searches for `query` fail with a 503
    pub fn fail_search(&self, query: &str) {
        self.failing_searches.lock().unwrap().insert(query.to_string());
    }

    /// Details requests for `id` fail with a 503
    pub fn fail_details(&self, id: i64) {
        self.failing_details.lock().unwrap().insert(id);
    }

    pub fn set_discover_delay(&self, delay: Duration) {
        *self.discover_delay.lock().unwrap() = delay;
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn details_calls(&self) -> usize {
        self.details_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn validate_key(&self) -> Result<(), CatalogError> {
        Ok(())
    }

    async fn genres(&self, content: ContentType) -> Result<Vec<Genre>, CatalogError> {
        Ok(self
            .genres
            .lock()
            .unwrap()
            .get(&content)
            .cloned()
            .unwrap_or_default())
    }

    async fn search(
        &self,
        content: ContentType,
        query: &str,
        _page: u32,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        if self.failing_searches.lock().unwrap().contains(query) {
            return Err(CatalogError::Http(503));
        }
        Ok(self
            .search
            .lock()
            .unwrap()
            .get(&(content, query.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn discover(
        &self,
        content: ContentType,
        category: TrendingCategory,
        page: u32,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        if content == ContentType::Movie && category == TrendingCategory::Popular {
            let mut failures = self.page_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CatalogError::Http(503));
                }
            }
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.discover_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&(content, category, page))
            .cloned()
            .unwrap_or_default())
    }

    async fn details(
        &self,
        content: ContentType,
        id: i64,
    ) -> Result<Option<MediaDetails>, CatalogError> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_details.lock().unwrap().contains(&id) {
            return Err(CatalogError::Http(503));
        }
        Ok(self.details.lock().unwrap().get(&(content, id)).cloned())
    }

    async fn imdb_id(&self, _content: ContentType, id: i64) -> Result<Option<String>, CatalogError> {
        Ok(self.imdb.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_imdb(
        &self,
        _content: ContentType,
        imdb_id: &str,
    ) -> Result<Option<i64>, CatalogError> {
        Ok(self
            .imdb
            .lock()
            .unwrap()
            .iter()
            .find(|(_, v)| v.as_str() == imdb_id)
            .map(|(id, _)| *id))
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct StoreState {
    genres: HashMap<(MediaKind, i64), Genre>,
    media: HashMap<MediaRef, MediaItem>,
    streams: Vec<StreamRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    list_filters: Mutex<Vec<MediaFilter>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters received by `list_media`, oldest first
    pub fn list_filters(&self) -> Vec<MediaFilter> {
        self.list_filters.lock().unwrap().clone()
    }

    pub fn media_count(&self, kind: MediaKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .media
            .keys()
            .filter(|r| r.kind == kind)
            .count()
    }

    pub fn genre_count(&self, kind: MediaKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .genres
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn stream_count(&self) -> usize {
        self.state.lock().unwrap().streams.len()
    }

    /// Seed a record directly, bypassing resolution
    pub fn put_stream(&self, key: StreamKey, access_url: &str, expires_at: DateTime<Utc>) -> StreamRecord {
        let record = StreamRecord {
            id: Uuid::new_v4(),
            provider: key.provider,
            media: key.media,
            season: key.season,
            episode: key.episode,
            audio: key.audio,
            quality: key.quality,
            access_url: access_url.to_string(),
            refresh_url: key.default_refresh_url(),
            expires_at,
        };
        self.state.lock().unwrap().streams.push(record.clone());
        record
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn find_media(&self, media: MediaRef) -> Result<Option<MediaItem>, StoreError> {
        Ok(self.state.lock().unwrap().media.get(&media).cloned())
    }

    async fn upsert_genre(&self, kind: MediaKind, genre: &Genre) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .genres
            .entry((kind, genre.id))
            .or_insert_with(|| genre.clone());
        if slot.is_placeholder() && !genre.is_placeholder() {
            slot.name = genre.name.clone();
        }
        Ok(())
    }

    async fn insert_media(&self, item: &MediaItem) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.media.contains_key(&item.media_ref()) {
            return Ok(false);
        }
        state.media.insert(item.media_ref(), item.clone());
        Ok(true)
    }

    async fn list_media(
        &self,
        kind: MediaKind,
        filter: &MediaFilter,
    ) -> Result<Vec<MediaItem>, StoreError> {
        self.list_filters.lock().unwrap().push(filter.clone());
        let mut items: Vec<MediaItem> = self
            .state
            .lock()
            .unwrap()
            .media
            .values()
            .filter(|m| m.kind == kind && filter.matches(m))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(a.id.cmp(&b.id)));
        Ok(items.into_iter().skip(filter.skip).take(filter.take).collect())
    }

    async fn find_stream(&self, key: &StreamKey) -> Result<Option<StreamRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .streams
            .iter()
            .find(|s| &s.key() == key)
            .cloned())
    }

    async fn find_stream_by_id(&self, id: Uuid) -> Result<Option<StreamRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .streams
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn streams_for(
        &self,
        media: MediaRef,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .streams
            .iter()
            .filter(|s| s.media == media && s.season == season && s.episode == episode)
            .cloned()
            .collect())
    }

    async fn insert_stream(&self, stream: &NewStream) -> Result<StreamRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.streams.iter_mut().find(|s| s.key() == stream.key) {
            existing.access_url = stream.access_url.clone();
            existing.refresh_url = stream.refresh_url.clone();
            existing.expires_at = stream.expires_at;
            return Ok(existing.clone());
        }

        let key = &stream.key;
        let record = StreamRecord {
            id: Uuid::new_v4(),
            provider: key.provider,
            media: key.media,
            season: key.season,
            episode: key.episode,
            audio: key.audio,
            quality: key.quality,
            access_url: stream.access_url.clone(),
            refresh_url: stream.refresh_url.clone(),
            expires_at: stream.expires_at,
        };
        state.streams.push(record.clone());
        Ok(record)
    }

    async fn refresh_stream(
        &self,
        record: &StreamRecord,
        access_url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<StreamRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        let existing = state
            .streams
            .iter_mut()
            .find(|s| s.id == record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.to_string()))?;
        existing.access_url = access_url.to_string();
        existing.expires_at = expires_at;
        Ok(existing.clone())
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Provider answering every request with one configured URL
pub struct StaticProvider {
    tag: ProviderTag,
    url: Mutex<Option<String>>,
    failing: Mutex<bool>,
    episodes: Mutex<Vec<EpisodeGroup>>,
    requests: Mutex<Vec<(Option<u32>, Option<u32>, Audio)>>,
}

impl StaticProvider {
    pub fn new(tag: ProviderTag) -> Self {
        Self {
            tag,
            url: Mutex::new(None),
            failing: Mutex::new(false),
            episodes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_url(self, url: &str) -> Self {
        *self.url.lock().unwrap() = Some(url.to_string());
        self
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn set_episodes(&self, episodes: Vec<EpisodeGroup>) {
        *self.episodes.lock().unwrap() = episodes;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// (season, episode, audio) of every resolution request
    pub fn requests(&self) -> Vec<(Option<u32>, Option<u32>, Audio)> {
        self.requests.lock().unwrap().clone()
    }

    fn answer(&self) -> Result<Option<String>, ProviderError> {
        if *self.failing.lock().unwrap() {
            return Err(HttpError::Timeout.into());
        }
        Ok(self.url.lock().unwrap().clone())
    }
}

impl CatalogProvider for StaticProvider {}

#[async_trait]
impl StreamProvider for StaticProvider {
    async fn resolve_movie_url(
        &self,
        _media: &MediaItem,
        audio: Audio,
        _quality: Quality,
    ) -> Result<Option<String>, ProviderError> {
        self.requests.lock().unwrap().push((None, None, audio));
        self.answer()
    }

    async fn resolve_series_url(
        &self,
        _media: &MediaItem,
        season: u32,
        episode: u32,
        audio: Audio,
    ) -> Result<Option<String>, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((Some(season), Some(episode), audio));
        self.answer()
    }

    async fn list_episodes(&self, _media: &MediaItem) -> Result<Vec<EpisodeGroup>, ProviderError> {
        Ok(self.episodes.lock().unwrap().clone())
    }
}

impl ContentProvider for StaticProvider {
    fn tag(&self) -> ProviderTag {
        self.tag
    }

    fn label(&self) -> &'static str {
        self.tag.as_str()
    }
}
