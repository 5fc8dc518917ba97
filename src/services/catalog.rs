//! Media lookup, on-demand materialization and listing

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::omdb::{OmdbClient, OmdbTitle};
use super::tmdb::{CatalogApi, CatalogError};
use super::trending::TrendingIndex;
use crate::db::{materialize, MediaFilter, MediaStore, StoreError};
use crate::models::{
    CatalogEntry, ContentType, Genre, MediaDetails, MediaItem, MediaKind, MediaRef,
    TrendingCategory,
};

pub const DEFAULT_TAKE: usize = 25;
pub const MAX_TAKE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value
        .filter(|v| !v.is_empty())
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

/// Build a media item from an upstream detail record
pub fn item_from_details(kind: MediaKind, details: MediaDetails) -> MediaItem {
    MediaItem {
        kind,
        id: details.id,
        released_at: parse_date(details.release_date.as_deref()),
        title: details.title,
        description: details.overview,
        thumbnail: details.backdrop.unwrap_or_default(),
        poster: details.poster.unwrap_or_default(),
        rating: details.rating,
        genres: details.genres,
    }
}

/// Build a media item from a listing entry. Genres without a known name get a
/// placeholder.
pub fn item_from_entry(
    kind: MediaKind,
    entry: CatalogEntry,
    genre_names: Option<&HashMap<i64, String>>,
) -> MediaItem {
    let genres = entry
        .genre_ids
        .iter()
        .map(|id| match genre_names.and_then(|names| names.get(id)) {
            Some(name) => Genre {
                id: *id,
                name: name.clone(),
            },
            None => Genre::placeholder(*id),
        })
        .collect();

    MediaItem {
        kind,
        id: entry.id,
        released_at: parse_date(entry.release_date.as_deref()),
        title: entry.title,
        description: entry.overview,
        thumbnail: entry.backdrop.unwrap_or_default(),
        poster: entry.poster.unwrap_or_default(),
        rating: entry.rating,
        genres,
    }
}

/// Listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub trending: Option<String>,
    pub query: Option<String>,
    pub genre: Option<String>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

/// Catalog detail with optional secondary metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetail {
    #[serde(flatten)]
    pub item: MediaItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omdb: Option<OmdbTitle>,
}

pub struct CatalogService {
    catalog: Arc<dyn CatalogApi>,
    store: Arc<dyn MediaStore>,
    trending: Arc<TrendingIndex>,
    omdb: Arc<OmdbClient>,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        store: Arc<dyn MediaStore>,
        trending: Arc<TrendingIndex>,
        omdb: Arc<OmdbClient>,
    ) -> Self {
        Self {
            catalog,
            store,
            trending,
            omdb,
        }
    }

    /// Local store first, then the upstream catalog. An upstream hit is
    /// persisted before it is returned.
    pub async fn get_media(&self, media: MediaRef) -> Result<Option<MediaItem>, LookupError> {
        if let Some(item) = self.store.find_media(media).await? {
            return Ok(Some(item));
        }

        let Some(details) = self.catalog.details(media.kind.into(), media.id).await? else {
            debug!(media = %media, "Unknown to upstream catalog");
            return Ok(None);
        };

        let item = item_from_details(media.kind, details);
        materialize(self.store.as_ref(), &item).await?;
        info!(media = %media, title = %item.title, "Materialized media on demand");
        Ok(Some(item))
    }

    /// Look up a title by IMDB id
    pub async fn resolve_imdb(
        &self,
        kind: MediaKind,
        imdb_id: &str,
    ) -> Result<Option<MediaItem>, LookupError> {
        let content = ContentType::from(kind);
        match self.catalog.find_by_imdb(content, imdb_id).await? {
            Some(id) => self.get_media(MediaRef { kind, id }).await,
            None => Ok(None),
        }
    }

    /// Trending items when a category is given, the stored catalog otherwise
    pub async fn list(&self, kind: MediaKind, query: &ListQuery) -> Result<Vec<MediaItem>, LookupError> {
        let filter = MediaFilter {
            title: query
                .query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            genre: query
                .genre
                .as_deref()
                .filter(|g| !g.is_empty())
                .map(str::to_string),
            skip: query.skip.unwrap_or(0),
            take: query.take.unwrap_or(DEFAULT_TAKE).min(MAX_TAKE),
        };

        // The trending index is small and held in memory; stored media is
        // filtered and paged by the store
        match query.trending.as_deref().and_then(TrendingCategory::parse) {
            Some(category) => Ok(self
                .trending
                .items(kind, category)
                .await
                .into_iter()
                .filter(|item| filter.matches(item))
                .skip(filter.skip)
                .take(filter.take)
                .collect()),
            None => Ok(self.store.list_media(kind, &filter).await?),
        }
    }

    /// Media item enriched with IMDB id and OMDB metadata when available
    pub async fn detail(&self, media: MediaRef) -> Result<Option<MediaDetail>, LookupError> {
        let Some(item) = self.get_media(media).await? else {
            return Ok(None);
        };

        let imdb_id = match self.catalog.imdb_id(media.kind.into(), media.id).await {
            Ok(id) => id,
            Err(e) => {
                warn!(media = %media, error = %e, "IMDB id lookup failed");
                None
            }
        };

        let omdb = if self.omdb.is_enabled() {
            let lookup = match &imdb_id {
                Some(imdb_id) => self.omdb.by_imdb_id(imdb_id).await,
                None => {
                    let year = item.released_at.map(|d| d.year());
                    self.omdb.by_title(&item.title, year).await
                }
            };
            match lookup {
                Ok(title) => Some(title),
                Err(e) => {
                    debug!(media = %media, error = %e, "OMDB lookup failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(Some(MediaDetail { item, imdb_id, omdb }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, media_item, FakeCatalog, MemoryStore};
    use std::time::Duration;

    fn matrix_details() -> MediaDetails {
        MediaDetails {
            id: 603,
            title: "Matrix".to_string(),
            overview: "Neo descobre a verdade".to_string(),
            backdrop: Some("https://img.test/w1280/bd.jpg".to_string()),
            poster: None,
            rating: 8.2,
            release_date: Some("1999-03-31".to_string()),
            genres: vec![Genre {
                id: 28,
                name: "Ação".to_string(),
            }],
        }
    }

    fn service(catalog: Arc<FakeCatalog>, store: Arc<MemoryStore>, trending: Arc<TrendingIndex>) -> CatalogService {
        let omdb = OmdbClient::new(
            "http://omdb.invalid",
            None,
            Duration::from_secs(1),
            Duration::from_secs(60),
            None,
        )
        .unwrap();
        CatalogService::new(catalog, store, trending, Arc::new(omdb))
    }

    #[test]
    fn test_item_from_entry_uses_placeholders() {
        let names: HashMap<i64, String> = [(28, "Ação".to_string())].into_iter().collect();
        let item = item_from_entry(
            MediaKind::Movie,
            entry(603, "Matrix", Some("1999-03-31"), vec![28, 99]),
            Some(&names),
        );

        assert_eq!(item.genres[0].name, "Ação");
        assert!(item.genres[1].is_placeholder());
        assert_eq!(item.released_at, NaiveDate::from_ymd_opt(1999, 3, 31));
        assert_eq!(item.thumbnail, "");
    }

    #[tokio::test]
    async fn test_get_media_materializes_once() {
        let catalog = Arc::new(FakeCatalog::new());
        catalog.set_details(ContentType::Movie, matrix_details());
        let store = Arc::new(MemoryStore::new());
        let svc = service(catalog.clone(), store.clone(), Arc::new(TrendingIndex::new()));

        let first = svc.get_media(MediaRef::movie(603)).await.unwrap().unwrap();
        let second = svc.get_media(MediaRef::movie(603)).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.details_calls(), 1);
        assert_eq!(store.media_count(MediaKind::Movie), 1);
        assert_eq!(store.genre_count(MediaKind::Movie), 1);
    }

    #[tokio::test]
    async fn test_unknown_media_is_none() {
        let svc = service(
            Arc::new(FakeCatalog::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(TrendingIndex::new()),
        );
        assert!(svc.get_media(MediaRef::series(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_imdb() {
        let catalog = Arc::new(FakeCatalog::new());
        catalog.set_details(ContentType::Movie, matrix_details());
        catalog.set_imdb(603, "tt0133093");
        let svc = service(catalog, Arc::new(MemoryStore::new()), Arc::new(TrendingIndex::new()));

        let item = svc
            .resolve_imdb(MediaKind::Movie, "tt0133093")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.id, 603);
        assert!(svc.resolve_imdb(MediaKind::Movie, "tt0000001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = Arc::new(MemoryStore::new());
        for (id, title, rating) in [(1, "Matrix", 8.2), (2, "Matrix Reloaded", 7.0), (3, "Clube da Luta", 8.4)] {
            let mut item = media_item(MediaKind::Movie, id, title);
            item.rating = rating;
            store.insert_media(&item).await.unwrap();
        }
        let svc = service(Arc::new(FakeCatalog::new()), store, Arc::new(TrendingIndex::new()));

        let all = svc.list(MediaKind::Movie, &ListQuery::default()).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);

        let query = ListQuery {
            query: Some("MATRIX".to_string()),
            skip: Some(1),
            ..Default::default()
        };
        let found = svc.list(MediaKind::Movie, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[tokio::test]
    async fn test_list_window_is_applied_by_store() {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=300 {
            let mut item = media_item(MediaKind::Movie, id, &format!("Filme {}", id));
            item.rating = id as f64 / 10.0;
            store.insert_media(&item).await.unwrap();
        }
        let svc = service(Arc::new(FakeCatalog::new()), store.clone(), Arc::new(TrendingIndex::new()));

        let query = ListQuery {
            query: Some("  filme ".to_string()),
            skip: Some(10),
            take: Some(500),
            ..Default::default()
        };
        let page = svc.list(MediaKind::Movie, &query).await.unwrap();
        assert_eq!(page.len(), MAX_TAKE);
        assert_eq!(page[0].id, 290);

        assert_eq!(
            store.list_filters(),
            vec![MediaFilter {
                title: Some("filme".to_string()),
                genre: None,
                skip: 10,
                take: MAX_TAKE,
            }]
        );
    }

    #[tokio::test]
    async fn test_list_from_trending_index() {
        let trending = Arc::new(TrendingIndex::new());
        trending
            .insert(TrendingCategory::Popular, media_item(MediaKind::Series, 1399, "Game of Thrones"), 1, 0)
            .await;
        let svc = service(Arc::new(FakeCatalog::new()), Arc::new(MemoryStore::new()), trending);

        let query = ListQuery {
            trending: Some("popular".to_string()),
            ..Default::default()
        };
        let items = svc.list(MediaKind::Series, &query).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(svc.list(MediaKind::Movie, &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detail_without_omdb() {
        let catalog = Arc::new(FakeCatalog::new());
        catalog.set_details(ContentType::Movie, matrix_details());
        catalog.set_imdb(603, "tt0133093");
        let svc = service(catalog, Arc::new(MemoryStore::new()), Arc::new(TrendingIndex::new()));

        let detail = svc.detail(MediaRef::movie(603)).await.unwrap().unwrap();
        assert_eq!(detail.imdb_id.as_deref(), Some("tt0133093"));
        assert!(detail.omdb.is_none());
    }
}
