//! Genre repository

use sqlx::PgPool;

use crate::db::models::{GenreLinkRow, GenreRow, Tables};
use crate::models::{Genre, MediaKind};

/// Insert a genre if absent. A placeholder name is replaced once the real
/// name is known; a real name is never overwritten by a placeholder.
pub async fn upsert_genre(pool: &PgPool, kind: MediaKind, genre: &Genre) -> Result<(), sqlx::Error> {
    let t = Tables::for_kind(kind);
    let sql = format!(
        r#"
        INSERT INTO {genres} (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        WHERE {genres}.name = 'Genre ' || {genres}.id::TEXT
          AND EXCLUDED.name <> 'Genre ' || EXCLUDED.id::TEXT
        "#,
        genres = t.genres
    );

    sqlx::query(&sql)
        .bind(genre.id)
        .bind(&genre.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Genres linked to one media item
pub async fn find_for_media(
    pool: &PgPool,
    kind: MediaKind,
    media_id: i64,
) -> Result<Vec<GenreRow>, sqlx::Error> {
    let t = Tables::for_kind(kind);
    let sql = format!(
        r#"
        SELECT g.id, g.name
        FROM {genres} g
        JOIN {links} l ON l.genre_id = g.id
        WHERE l.{fk} = $1
        ORDER BY g.name
        "#,
        genres = t.genres,
        links = t.links,
        fk = t.link_fk
    );

    sqlx::query_as::<_, GenreRow>(&sql)
        .bind(media_id)
        .fetch_all(pool)
        .await
}

/// Genre links of the given media items
pub async fn links_for(
    pool: &PgPool,
    kind: MediaKind,
    media_ids: &[i64],
) -> Result<Vec<GenreLinkRow>, sqlx::Error> {
    let t = Tables::for_kind(kind);
    let sql = format!(
        r#"
        SELECT l.{fk} AS media_id, g.id, g.name
        FROM {links} l
        JOIN {genres} g ON g.id = l.genre_id
        WHERE l.{fk} = ANY($1)
        ORDER BY g.name
        "#,
        genres = t.genres,
        links = t.links,
        fk = t.link_fk
    );

    sqlx::query_as::<_, GenreLinkRow>(&sql)
        .bind(media_ids)
        .fetch_all(pool)
        .await
}
