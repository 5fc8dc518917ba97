//! Database row types for PostgreSQL
//!
//! These map directly to rows and convert into the domain types in
//! `crate::models`.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{
    Audio, Genre, MediaItem, MediaKind, MediaRef, ProviderTag, Quality, StreamRecord,
};

use super::StoreError;

// ============================================================================
// Table names
// ============================================================================

/// Table and column names for one media kind
#[derive(Debug, Clone, Copy)]
pub struct Tables {
    pub media: &'static str,
    pub genres: &'static str,
    pub links: &'static str,
    pub link_fk: &'static str,
    pub streams: &'static str,
}

impl Tables {
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Movie => Tables {
                media: "movies",
                genres: "movie_genres",
                links: "movie_genre_links",
                link_fk: "movie_id",
                streams: "movie_streams",
            },
            MediaKind::Series => Tables {
                media: "series",
                genres: "series_genres",
                links: "series_genre_links",
                link_fk: "series_id",
                streams: "series_streams",
            },
        }
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

/// Movie or series row
#[derive(Debug, Clone, FromRow)]
pub struct MediaRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub poster: String,
    pub rating: f64,
    pub released_at: Option<NaiveDate>,
}

impl MediaRow {
    pub fn into_item(self, kind: MediaKind, genres: Vec<Genre>) -> MediaItem {
        MediaItem {
            kind,
            id: self.id,
            title: self.title,
            description: self.description,
            thumbnail: self.thumbnail,
            poster: self.poster,
            rating: self.rating,
            released_at: self.released_at,
            genres,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GenreRow {
    pub id: i64,
    pub name: String,
}

impl From<GenreRow> for Genre {
    fn from(row: GenreRow) -> Self {
        Genre {
            id: row.id,
            name: row.name,
        }
    }
}

/// Genre joined with the media id it is linked to
#[derive(Debug, Clone, FromRow)]
pub struct GenreLinkRow {
    pub media_id: i64,
    pub id: i64,
    pub name: String,
}

/// Stream row. Movie queries select NULL season/episode.
#[derive(Debug, Clone, FromRow)]
pub struct StreamRow {
    pub id: Uuid,
    pub provider: String,
    pub media_id: i64,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub audio: String,
    pub quality: String,
    pub access_url: String,
    pub refresh_url: String,
    pub expires_at: DateTime<Utc>,
}

fn index_field(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("negative season/episode {}", value)))
}

impl StreamRow {
    pub fn into_record(self, kind: MediaKind) -> Result<StreamRecord, StoreError> {
        let provider = ProviderTag::parse(&self.provider)
            .ok_or_else(|| StoreError::Decode(format!("unknown provider '{}'", self.provider)))?;
        let audio = Audio::parse(&self.audio)
            .ok_or_else(|| StoreError::Decode(format!("unknown audio '{}'", self.audio)))?;
        let quality = Quality::parse(&self.quality)
            .ok_or_else(|| StoreError::Decode(format!("unknown quality '{}'", self.quality)))?;

        Ok(StreamRecord {
            id: self.id,
            provider,
            media: MediaRef {
                kind,
                id: self.media_id,
            },
            season: self.season.map(index_field).transpose()?,
            episode: self.episode.map(index_field).transpose()?,
            audio,
            quality,
            access_url: self.access_url,
            refresh_url: self.refresh_url,
            expires_at: self.expires_at,
        })
    }
}
