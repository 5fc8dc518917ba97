//! Catalog synchronizer and trending index
//!
//! A sync pass pulls pages `1..=pages` of every listing category from the
//! upstream catalog with at most `concurrency` pages in flight, retries the
//! pages that failed with exponential backoff, then persists what it got and
//! rebuilds the trending index from it.

use futures::{stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::catalog::item_from_entry;
use super::providers::{ContentProvider, ProviderError, ProviderRegistry};
use super::tmdb::{CatalogApi, CatalogError};
use crate::db::{materialize, MediaStore, StoreError};
use crate::metrics::SYNC_PAGES;
use crate::models::{CatalogEntry, ContentType, MediaItem, MediaKind, TrendingCategory};

// ============================================================================
// Trending index
// ============================================================================

#[derive(Debug, Clone)]
struct Ranked {
    item: MediaItem,
    page: u32,
    position: usize,
}

/// In-memory map of `(category, media id)` to catalog item, per media kind
#[derive(Default)]
pub struct TrendingIndex {
    entries: RwLock<HashMap<(MediaKind, TrendingCategory, i64), Ranked>>,
}

impl TrendingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Register an item. A duplicate keeps its best rank.
    pub async fn insert(&self, category: TrendingCategory, item: MediaItem, page: u32, position: usize) {
        let key = (item.kind, category, item.id);
        let mut entries = self.entries.write().await;
        match entries.get_mut(&key) {
            Some(existing) if (existing.page, existing.position) <= (page, position) => {
                existing.item = item;
            }
            _ => {
                entries.insert(key, Ranked { item, page, position });
            }
        }
    }

    /// Items of one category in upstream order. `All` merges every category.
    pub async fn items(&self, kind: MediaKind, category: TrendingCategory) -> Vec<MediaItem> {
        let entries = self.entries.read().await;

        let mut best: HashMap<i64, &Ranked> = HashMap::new();
        for ((k, c, id), ranked) in entries.iter() {
            if *k != kind || (category != TrendingCategory::All && *c != category) {
                continue;
            }
            let slot = best.entry(*id).or_insert(ranked);
            if (ranked.page, ranked.position) < (slot.page, slot.position) {
                *slot = ranked;
            }
        }

        let mut ranked: Vec<&Ranked> = best.into_values().collect();
        ranked.sort_by_key(|r| (r.page, r.position, r.item.id));
        ranked.into_iter().map(|r| r.item.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

// ============================================================================
// Retry policy
// ============================================================================

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub pages: u32,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pages: 100,
            concurrency: 25,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub items_fetched: usize,
    pub items_persisted: usize,
    pub items_failed: usize,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Outcome of one provider catalog indexing run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIndexReport {
    pub provider: String,
    pub scraped: usize,
    pub stored: usize,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct FetchedItem {
    kind: MediaKind,
    category: TrendingCategory,
    page: u32,
    position: usize,
    entry: CatalogEntry,
}

/// Clears the running flag when a pass ends, is cancelled or panics
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct CatalogSynchronizer {
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn MediaStore>,
    registry: Arc<ProviderRegistry>,
    index: Arc<TrendingIndex>,
    settings: SyncSettings,
    running: AtomicBool,
}

impl CatalogSynchronizer {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        store: Arc<dyn MediaStore>,
        registry: Arc<ProviderRegistry>,
        index: Arc<TrendingIndex>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            catalog,
            store,
            registry,
            index,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<TrendingIndex> {
        &self.index
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one pass. Returns `None` when a pass is already in progress.
    pub async fn run_pass(&self) -> Option<SyncReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Catalog sync already running, skipping");
            return None;
        }

        let _guard = RunningGuard(&self.running);
        Some(self.sync_trending().await)
    }

    async fn sync_trending(&self) -> SyncReport {
        let started = Instant::now();
        let mut report = SyncReport::default();

        info!(
            pages = self.settings.pages,
            concurrency = self.settings.concurrency,
            "Starting catalog sync"
        );
        self.index.clear().await;

        let genre_names = self.genre_names().await;

        let mut pending: Vec<u32> = (1..=self.settings.pages).collect();
        let mut fetched: Vec<FetchedItem> = Vec::new();
        let max_attempts = self.settings.retry.max_attempts.max(1);

        for attempt in 0..max_attempts {
            report.attempts = attempt + 1;

            let results: Vec<(u32, Result<Vec<FetchedItem>, CatalogError>)> =
                stream::iter(pending.iter().copied())
                    .map(|page| async move { (page, self.fetch_page(page).await) })
                    .buffer_unordered(self.settings.concurrency.max(1))
                    .collect()
                    .await;

            let mut failed = Vec::new();
            for (page, result) in results {
                match result {
                    Ok(items) => {
                        report.pages_ok += 1;
                        SYNC_PAGES.with_label_values(&["ok"]).inc();
                        fetched.extend(items);
                    }
                    Err(e) => {
                        debug!(page, error = %e, "Catalog page failed");
                        SYNC_PAGES.with_label_values(&["failed"]).inc();
                        failed.push(page);
                    }
                }
            }

            if failed.is_empty() {
                pending = failed;
                break;
            }

            failed.sort_unstable();
            warn!(
                attempt = attempt + 1,
                failed = failed.len(),
                "Catalog pages failed"
            );
            pending = failed;

            if attempt + 1 < max_attempts {
                tokio::time::sleep(self.settings.retry.delay(attempt)).await;
            }
        }

        report.pages_failed = pending.len();
        report.items_fetched = fetched.len();

        let genre_names = &genre_names;
        let outcomes: Vec<Result<(), StoreError>> = stream::iter(fetched)
            .map(|item| async move { self.persist(item, genre_names).await })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(()) => report.items_persisted += 1,
                Err(e) => {
                    warn!(error = %e, "Failed to persist catalog item");
                    report.items_failed += 1;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pages_ok = report.pages_ok,
            pages_failed = report.pages_failed,
            items = report.items_persisted,
            failed_items = report.items_failed,
            duration_ms = report.duration_ms,
            "Catalog sync completed"
        );
        report
    }

    async fn genre_names(&self) -> HashMap<ContentType, HashMap<i64, String>> {
        let mut names = HashMap::new();
        for content in [ContentType::Movie, ContentType::Tv] {
            let genres = match self.catalog.genres(content).await {
                Ok(genres) => genres,
                Err(e) => {
                    warn!(content = content.path(), error = %e, "Genre list unavailable, using placeholders");
                    Vec::new()
                }
            };
            names.insert(
                content,
                genres.into_iter().map(|g| (g.id, g.name)).collect(),
            );
        }
        names
    }

    /// Every listing category of one page. Any failure fails the whole page.
    async fn fetch_page(&self, page: u32) -> Result<Vec<FetchedItem>, CatalogError> {
        let requests = TrendingCategory::MOVIE_SYNC
            .iter()
            .map(|c| (ContentType::Movie, *c))
            .chain(TrendingCategory::SERIES_SYNC.iter().map(|c| (ContentType::Tv, *c)));

        let mut items = Vec::new();
        for (content, category) in requests {
            let entries = self.catalog.discover(content, category, page).await?;
            items.extend(
                entries
                    .into_iter()
                    .enumerate()
                    .map(|(position, entry)| FetchedItem {
                        kind: content.kind(),
                        category,
                        page,
                        position,
                        entry,
                    }),
            );
        }
        Ok(items)
    }

    async fn persist(
        &self,
        fetched: FetchedItem,
        genre_names: &HashMap<ContentType, HashMap<i64, String>>,
    ) -> Result<(), StoreError> {
        let names = genre_names.get(&ContentType::from(fetched.kind));
        let item = item_from_entry(fetched.kind, fetched.entry, names);

        let item = match self.store.find_media(item.media_ref()).await? {
            Some(stored) => stored,
            None => {
                materialize(self.store.as_ref(), &item).await?;
                item
            }
        };

        self.index
            .insert(fetched.category, item, fetched.page, fetched.position)
            .await;
        Ok(())
    }

    /// Scrape and store the catalog of every provider that publishes one
    pub async fn index_providers(&self) -> Vec<ProviderIndexReport> {
        let mut reports = Vec::new();
        for provider in self.registry.all() {
            reports.push(self.index_provider(provider.as_ref()).await);
        }
        reports
    }

    async fn index_provider(&self, provider: &dyn ContentProvider) -> ProviderIndexReport {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..max_attempts {
            match self.try_index(provider).await {
                Ok((scraped, stored)) => {
                    info!(
                        provider = %provider.tag(),
                        scraped,
                        stored,
                        "Provider catalog indexed"
                    );
                    return ProviderIndexReport {
                        provider: provider.tag().to_string(),
                        scraped,
                        stored,
                        attempts: attempt + 1,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(provider = %provider.tag(), attempt = attempt + 1, error = %e, "Provider indexing failed");
                    last_error = Some(e);
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.settings.retry.delay(attempt)).await;
                    }
                }
            }
        }

        ProviderIndexReport {
            provider: provider.tag().to_string(),
            scraped: 0,
            stored: 0,
            attempts: max_attempts,
            error: last_error.map(|e| e.to_string()),
        }
    }

    async fn try_index(&self, provider: &dyn ContentProvider) -> Result<(usize, usize), ProviderError> {
        let items = provider.fetch_catalog().await?;
        if items.is_empty() {
            return Ok((0, 0));
        }
        let stored = provider.materialize_catalog(&items).await?;
        Ok((items.len(), stored))
    }
}
