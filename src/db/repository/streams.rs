//! Stream record repository
//!
//! Movie and series streams live in separate tables; both are read into the
//! same `StreamRow` shape, with NULL season/episode for movies.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{StreamRow, Tables};
use crate::models::{MediaKind, MediaRef, NewStream, StreamKey};

const MOVIE_COLUMNS: &str = "id, provider, movie_id AS media_id, NULL::INTEGER AS season, \
     NULL::INTEGER AS episode, audio, quality, access_url, refresh_url, expires_at";

const SERIES_COLUMNS: &str = "id, provider, series_id AS media_id, season, episode, \
     audio, quality, access_url, refresh_url, expires_at";

fn columns(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Movie => MOVIE_COLUMNS,
        MediaKind::Series => SERIES_COLUMNS,
    }
}

/// Season/episode as bound to an INTEGER column; movies bind 0
fn index_column(value: Option<u32>) -> Result<i32, sqlx::Error> {
    i32::try_from(value.unwrap_or(0)).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Find the record for an exact key
pub async fn find_by_key(pool: &PgPool, key: &StreamKey) -> Result<Option<StreamRow>, sqlx::Error> {
    match key.media.kind {
        MediaKind::Movie => {
            let sql = format!(
                r#"
                SELECT {cols}
                FROM movie_streams
                WHERE movie_id = $1 AND provider = $2 AND audio = $3 AND quality = $4
                "#,
                cols = MOVIE_COLUMNS
            );
            sqlx::query_as::<_, StreamRow>(&sql)
                .bind(key.media.id)
                .bind(key.provider.as_str())
                .bind(key.audio.as_str())
                .bind(key.quality.as_str())
                .fetch_optional(pool)
                .await
        }
        MediaKind::Series => {
            let sql = format!(
                r#"
                SELECT {cols}
                FROM series_streams
                WHERE series_id = $1 AND season = $2 AND episode = $3
                  AND provider = $4 AND audio = $5 AND quality = $6
                "#,
                cols = SERIES_COLUMNS
            );
            sqlx::query_as::<_, StreamRow>(&sql)
                .bind(key.media.id)
                .bind(index_column(key.season)?)
                .bind(index_column(key.episode)?)
                .bind(key.provider.as_str())
                .bind(key.audio.as_str())
                .bind(key.quality.as_str())
                .fetch_optional(pool)
                .await
        }
    }
}

/// Find a record by id in either table
pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<(MediaKind, StreamRow)>, sqlx::Error> {
    for kind in [MediaKind::Movie, MediaKind::Series] {
        let table = Tables::for_kind(kind).streams;
        let sql = format!("SELECT {} FROM {} WHERE id = $1", columns(kind), table);

        if let Some(row) = sqlx::query_as::<_, StreamRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
        {
            return Ok(Some((kind, row)));
        }
    }

    Ok(None)
}

/// Records for a movie, or for one episode of a series
pub async fn list_for(
    pool: &PgPool,
    media: MediaRef,
    season: Option<u32>,
    episode: Option<u32>,
) -> Result<Vec<StreamRow>, sqlx::Error> {
    match media.kind {
        MediaKind::Movie => {
            let sql = format!(
                "SELECT {} FROM movie_streams WHERE movie_id = $1 ORDER BY provider, audio",
                MOVIE_COLUMNS
            );
            sqlx::query_as::<_, StreamRow>(&sql)
                .bind(media.id)
                .fetch_all(pool)
                .await
        }
        MediaKind::Series => {
            let sql = format!(
                r#"
                SELECT {cols}
                FROM series_streams
                WHERE series_id = $1 AND season = $2 AND episode = $3
                ORDER BY provider, audio
                "#,
                cols = SERIES_COLUMNS
            );
            sqlx::query_as::<_, StreamRow>(&sql)
                .bind(media.id)
                .bind(index_column(season)?)
                .bind(index_column(episode)?)
                .fetch_all(pool)
                .await
        }
    }
}

/// Insert a record, or overwrite the one already holding its key
pub async fn upsert(pool: &PgPool, stream: &NewStream) -> Result<StreamRow, sqlx::Error> {
    let key = &stream.key;

    match key.media.kind {
        MediaKind::Movie => {
            let sql = format!(
                r#"
                INSERT INTO movie_streams (id, provider, movie_id, audio, quality, access_url, refresh_url, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (movie_id, provider, audio, quality) DO UPDATE SET
                    access_url = EXCLUDED.access_url,
                    refresh_url = EXCLUDED.refresh_url,
                    expires_at = EXCLUDED.expires_at,
                    updated_at = NOW()
                RETURNING {cols}
                "#,
                cols = MOVIE_COLUMNS
            );
            sqlx::query_as::<_, StreamRow>(&sql)
                .bind(Uuid::new_v4())
                .bind(key.provider.as_str())
                .bind(key.media.id)
                .bind(key.audio.as_str())
                .bind(key.quality.as_str())
                .bind(&stream.access_url)
                .bind(&stream.refresh_url)
                .bind(stream.expires_at)
                .fetch_one(pool)
                .await
        }
        MediaKind::Series => {
            let sql = format!(
                r#"
                INSERT INTO series_streams (id, provider, series_id, season, episode, audio, quality, access_url, refresh_url, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (series_id, season, episode, provider, audio, quality) DO UPDATE SET
                    access_url = EXCLUDED.access_url,
                    refresh_url = EXCLUDED.refresh_url,
                    expires_at = EXCLUDED.expires_at,
                    updated_at = NOW()
                RETURNING {cols}
                "#,
                cols = SERIES_COLUMNS
            );
            sqlx::query_as::<_, StreamRow>(&sql)
                .bind(Uuid::new_v4())
                .bind(key.provider.as_str())
                .bind(key.media.id)
                .bind(index_column(key.season)?)
                .bind(index_column(key.episode)?)
                .bind(key.audio.as_str())
                .bind(key.quality.as_str())
                .bind(&stream.access_url)
                .bind(&stream.refresh_url)
                .bind(stream.expires_at)
                .fetch_one(pool)
                .await
        }
    }
}

/// Replace the URL and expiry of an existing record, keeping its id
pub async fn refresh(
    pool: &PgPool,
    kind: MediaKind,
    id: Uuid,
    access_url: &str,
    expires_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let table = Tables::for_kind(kind).streams;
    let sql = format!(
        r#"
        UPDATE {table}
        SET access_url = $2, expires_at = $3, updated_at = NOW()
        WHERE id = $1
        "#,
        table = table
    );

    let result = sqlx::query(&sql)
        .bind(id)
        .bind(access_url)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn count(pool: &PgPool, kind: MediaKind) -> Result<i64, sqlx::Error> {
    let table = Tables::for_kind(kind).streams;
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
