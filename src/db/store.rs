//! Storage seam used by the services
//!
//! Services talk to `MediaStore` rather than the pool so that resolution and
//! sync logic can run against an in-memory store in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::MediaRow;
use super::repository::{genres, media, streams};
use super::StoreError;
use crate::models::{Genre, MediaItem, MediaKind, MediaRef, NewStream, StreamKey, StreamRecord};

/// Filter and window applied by the store when listing media
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFilter {
    /// Case-insensitive title substring
    pub title: Option<String>,
    /// Case-insensitive genre name
    pub genre: Option<String>,
    pub skip: usize,
    pub take: usize,
}

impl MediaFilter {
    pub fn matches(&self, item: &MediaItem) -> bool {
        let title = self
            .title
            .as_ref()
            .map_or(true, |t| item.title.to_lowercase().contains(&t.to_lowercase()));
        title && self.genre.as_deref().map_or(true, |g| item.has_genre(g))
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn find_media(&self, media: MediaRef) -> Result<Option<MediaItem>, StoreError>;

    /// Insert a genre if absent
    async fn upsert_genre(&self, kind: MediaKind, genre: &Genre) -> Result<(), StoreError>;

    /// Insert a media item with its genre links. Idempotent.
    async fn insert_media(&self, item: &MediaItem) -> Result<bool, StoreError>;

    /// One window of stored items, highest rated first
    async fn list_media(
        &self,
        kind: MediaKind,
        filter: &MediaFilter,
    ) -> Result<Vec<MediaItem>, StoreError>;

    async fn find_stream(&self, key: &StreamKey) -> Result<Option<StreamRecord>, StoreError>;

    async fn find_stream_by_id(&self, id: Uuid) -> Result<Option<StreamRecord>, StoreError>;

    /// Records for a movie, or for one episode when season/episode are set
    async fn streams_for(
        &self,
        media: MediaRef,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Vec<StreamRecord>, StoreError>;

    /// Insert a record. A record already holding the key is overwritten.
    async fn insert_stream(&self, stream: &NewStream) -> Result<StreamRecord, StoreError>;

    /// Update URL and expiry in place
    async fn refresh_stream(
        &self,
        record: &StreamRecord,
        access_url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<StreamRecord, StoreError>;
}

/// Upsert every genre of an item, then the item itself
pub async fn materialize(store: &dyn MediaStore, item: &MediaItem) -> Result<bool, StoreError> {
    for genre in &item.genres {
        store.upsert_genre(item.kind, genre).await?;
    }
    store.insert_media(item).await
}

// ============================================================================
// PostgreSQL
// ============================================================================

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaStore for PgStore {
    async fn find_media(&self, media_ref: MediaRef) -> Result<Option<MediaItem>, StoreError> {
        let Some(row) = media::find_by_id(&self.pool, media_ref.kind, media_ref.id).await? else {
            return Ok(None);
        };

        let genres = genres::find_for_media(&self.pool, media_ref.kind, media_ref.id)
            .await?
            .into_iter()
            .map(Genre::from)
            .collect();

        Ok(Some(row.into_item(media_ref.kind, genres)))
    }

    async fn upsert_genre(&self, kind: MediaKind, genre: &Genre) -> Result<(), StoreError> {
        genres::upsert_genre(&self.pool, kind, genre).await?;
        Ok(())
    }

    async fn insert_media(&self, item: &MediaItem) -> Result<bool, StoreError> {
        Ok(media::insert_media(&self.pool, item).await?)
    }

    async fn list_media(
        &self,
        kind: MediaKind,
        filter: &MediaFilter,
    ) -> Result<Vec<MediaItem>, StoreError> {
        let rows: Vec<MediaRow> = media::list_page(&self.pool, kind, filter).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut by_media: HashMap<i64, Vec<Genre>> = HashMap::new();
        for link in genres::links_for(&self.pool, kind, &ids).await? {
            by_media.entry(link.media_id).or_default().push(Genre {
                id: link.id,
                name: link.name,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let genres = by_media.remove(&row.id).unwrap_or_default();
                row.into_item(kind, genres)
            })
            .collect())
    }

    async fn find_stream(&self, key: &StreamKey) -> Result<Option<StreamRecord>, StoreError> {
        streams::find_by_key(&self.pool, key)
            .await?
            .map(|row| row.into_record(key.media.kind))
            .transpose()
    }

    async fn find_stream_by_id(&self, id: Uuid) -> Result<Option<StreamRecord>, StoreError> {
        streams::find_by_id(&self.pool, id)
            .await?
            .map(|(kind, row)| row.into_record(kind))
            .transpose()
    }

    async fn streams_for(
        &self,
        media_ref: MediaRef,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Vec<StreamRecord>, StoreError> {
        streams::list_for(&self.pool, media_ref, season, episode)
            .await?
            .into_iter()
            .map(|row| row.into_record(media_ref.kind))
            .collect()
    }

    async fn insert_stream(&self, stream: &NewStream) -> Result<StreamRecord, StoreError> {
        streams::upsert(&self.pool, stream)
            .await?
            .into_record(stream.key.media.kind)
    }

    async fn refresh_stream(
        &self,
        record: &StreamRecord,
        access_url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<StreamRecord, StoreError> {
        let updated =
            streams::refresh(&self.pool, record.media.kind, record.id, access_url, expires_at)
                .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(record.id.to_string()));
        }

        Ok(StreamRecord {
            access_url: access_url.to_string(),
            expires_at,
            ..record.clone()
        })
    }
}
