//! Movie and series repository

use sqlx::PgPool;

use crate::db::models::{MediaRow, Tables};
use crate::db::MediaFilter;
use crate::models::{MediaItem, MediaKind};

pub async fn find_by_id(
    pool: &PgPool,
    kind: MediaKind,
    id: i64,
) -> Result<Option<MediaRow>, sqlx::Error> {
    let t = Tables::for_kind(kind);
    let sql = format!(
        r#"
        SELECT id, title, description, thumbnail, poster, rating, released_at
        FROM {media}
        WHERE id = $1
        "#,
        media = t.media
    );

    sqlx::query_as::<_, MediaRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Insert a media item and its genre links. Existing rows are left untouched,
/// so repeated materialization of the same item is a no-op.
///
/// Genres must already exist.
pub async fn insert_media(pool: &PgPool, item: &MediaItem) -> Result<bool, sqlx::Error> {
    let t = Tables::for_kind(item.kind);
    let mut tx = pool.begin().await?;

    let insert = format!(
        r#"
        INSERT INTO {media} (id, title, description, thumbnail, poster, rating, released_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO NOTHING
        "#,
        media = t.media
    );

    let result = sqlx::query(&insert)
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.thumbnail)
        .bind(&item.poster)
        .bind(item.rating)
        .bind(item.released_at)
        .execute(&mut *tx)
        .await?;

    let link = format!(
        r#"
        INSERT INTO {links} ({fk}, genre_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
        links = t.links,
        fk = t.link_fk
    );

    for genre in &item.genres {
        sqlx::query(&link)
            .bind(item.id)
            .bind(genre.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

/// One filtered window of a kind, highest rated first
pub async fn list_page(
    pool: &PgPool,
    kind: MediaKind,
    filter: &MediaFilter,
) -> Result<Vec<MediaRow>, sqlx::Error> {
    let t = Tables::for_kind(kind);
    let sql = format!(
        r#"
        SELECT m.id, m.title, m.description, m.thumbnail, m.poster, m.rating, m.released_at
        FROM {media} m
        WHERE ($1::TEXT IS NULL OR m.title ILIKE $1 ESCAPE '\')
          AND ($2::TEXT IS NULL OR EXISTS (
              SELECT 1
              FROM {links} l
              JOIN {genres} g ON g.id = l.genre_id
              WHERE l.{fk} = m.id AND LOWER(g.name) = LOWER($2)
          ))
        ORDER BY m.rating DESC, m.id
        OFFSET $3
        LIMIT $4
        "#,
        media = t.media,
        links = t.links,
        genres = t.genres,
        fk = t.link_fk
    );

    sqlx::query_as::<_, MediaRow>(&sql)
        .bind(filter.title.as_deref().map(contains_pattern))
        .bind(filter.genre.as_deref())
        .bind(i64::try_from(filter.skip).unwrap_or(i64::MAX))
        .bind(i64::try_from(filter.take).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await
}

/// ILIKE pattern matching `needle` anywhere, with wildcards escaped
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn count(pool: &PgPool, kind: MediaKind) -> Result<i64, sqlx::Error> {
    let t = Tables::for_kind(kind);
    let sql = format!("SELECT COUNT(*) FROM {}", t.media);
    let row: (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("matrix"), "%matrix%");
        assert_eq!(contains_pattern("100%_real"), r"%100\%\_real%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }
}
