//! Track queries
//!
//! Creating a track also creates its `manual:{id}` identity in the same
//! transaction; deleting one cascades over all owned rows explicitly.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{NewTrack, Track};
use crate::normalize::normalize_track;
use crate::{Error, Result};

const TRACK_COLUMNS: &str = "id, title, artists, album, genre, bpm, duration_ms, isrc, year, \
     release_date, spotify_added_at, explicit, cover_url, normalized_title, normalized_artists, \
     searched_not_found, created_at, updated_at";

fn select_tracks(where_clause: &str) -> String {
    format!("SELECT {TRACK_COLUMNS} FROM tracks {where_clause}")
}

/// Insert a track plus its automatic manual identity
pub async fn create_track(pool: &SqlitePool, new: &NewTrack) -> Result<Track> {
    let norm = normalize_track(&new.artists, &new.title);
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    let track_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tracks (title, artists, album, genre, bpm, duration_ms, isrc, year,
                            release_date, spotify_added_at, explicit, cover_url,
                            normalized_title, normalized_artists, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&new.title)
    .bind(&new.artists)
    .bind(&new.album)
    .bind(&new.genre)
    .bind(new.bpm)
    .bind(new.duration_ms)
    .bind(&new.isrc)
    .bind(new.year)
    .bind(new.release_date)
    .bind(new.spotify_added_at)
    .bind(new.explicit)
    .bind(&new.cover_url)
    .bind(&norm.normalized_title)
    .bind(&norm.normalized_artists)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO track_identities (track_id, provider, provider_track_id, created_at, updated_at)
        VALUES (?, 'manual', ?, ?, ?)
        "#,
    )
    .bind(track_id)
    .bind(format!("manual:{track_id}"))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    get_track(pool, track_id).await
}

pub async fn get_track(pool: &SqlitePool, id: i64) -> Result<Track> {
    sqlx::query_as::<_, Track>(&select_tracks("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Track {id}")))
}

pub async fn list_tracks(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Track>> {
    Ok(
        sqlx::query_as::<_, Track>(&select_tracks("ORDER BY id LIMIT ? OFFSET ?"))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?,
    )
}

/// Update mutable fields, re-deriving the normalized columns
pub async fn update_track(pool: &SqlitePool, id: i64, new: &NewTrack) -> Result<Track> {
    let norm = normalize_track(&new.artists, &new.title);
    let updated = sqlx::query(
        r#"
        UPDATE tracks
        SET title = ?, artists = ?, album = ?, genre = ?, bpm = ?, duration_ms = ?, isrc = ?,
            year = ?, release_date = ?, spotify_added_at = ?, explicit = ?, cover_url = ?,
            normalized_title = ?, normalized_artists = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&new.title)
    .bind(&new.artists)
    .bind(&new.album)
    .bind(&new.genre)
    .bind(new.bpm)
    .bind(new.duration_ms)
    .bind(&new.isrc)
    .bind(new.year)
    .bind(new.release_date)
    .bind(new.spotify_added_at)
    .bind(new.explicit)
    .bind(&new.cover_url)
    .bind(&norm.normalized_title)
    .bind(&norm.normalized_artists)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Track {id}")));
    }
    get_track(pool, id).await
}

/// Delete a track and everything it owns: identities, candidates, downloads,
/// playlist links and library file rows
pub async fn delete_track(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tracks WHERE id = ?)")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(Error::NotFound(format!("Track {id}")));
    }

    for table in [
        "track_identities",
        "downloads",
        "search_candidates",
        "playlist_tracks",
        "library_files",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE track_id = ?"))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn find_by_isrc(pool: &SqlitePool, isrc: &str) -> Result<Option<Track>> {
    Ok(sqlx::query_as::<_, Track>(&select_tracks("WHERE isrc = ?"))
        .bind(isrc)
        .fetch_optional(pool)
        .await?)
}

/// Lookup by the manual-import deduplication key
pub async fn find_by_normalized(
    pool: &SqlitePool,
    normalized_artists: &str,
    normalized_title: &str,
) -> Result<Option<Track>> {
    Ok(sqlx::query_as::<_, Track>(&select_tracks(
        "WHERE normalized_artists = ? AND normalized_title = ?",
    ))
    .bind(normalized_artists)
    .bind(normalized_title)
    .fetch_optional(pool)
    .await?)
}

/// Case-insensitive raw fallback used by the JSON importer
pub async fn find_by_raw(pool: &SqlitePool, artists: &str, title: &str) -> Result<Option<Track>> {
    Ok(sqlx::query_as::<_, Track>(&select_tracks(
        "WHERE lower(artists) = lower(?) AND lower(title) = lower(?)",
    ))
    .bind(artists)
    .bind(title)
    .fetch_optional(pool)
    .await?)
}

/// Tracks with a chosen candidate and no library file yet
pub async fn ready_for_download(pool: &SqlitePool) -> Result<Vec<Track>> {
    Ok(sqlx::query_as::<_, Track>(&select_tracks(
        r#"
        WHERE EXISTS (SELECT 1 FROM search_candidates c WHERE c.track_id = tracks.id AND c.chosen = 1)
          AND NOT EXISTS (SELECT 1 FROM library_files f WHERE f.track_id = tracks.id)
        ORDER BY id
        "#,
    ))
    .fetch_all(pool)
    .await?)
}

pub async fn set_searched_not_found(pool: &SqlitePool, id: i64, value: bool) -> Result<()> {
    sqlx::query("UPDATE tracks SET searched_not_found = ?, updated_at = ? WHERE id = ?")
        .bind(value)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_cover_url(pool: &SqlitePool, id: i64, cover_url: &str) -> Result<()> {
    sqlx::query("UPDATE tracks SET cover_url = ?, updated_at = ? WHERE id = ?")
        .bind(cover_url)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Latest `added_at` across this track's playlist memberships
pub async fn latest_added_at(
    pool: &SqlitePool,
    track_id: i64,
) -> Result<Option<chrono::DateTime<Utc>>> {
    Ok(sqlx::query_scalar(
        "SELECT MAX(added_at) FROM playlist_tracks WHERE track_id = ? AND added_at IS NOT NULL",
    )
    .bind(track_id)
    .fetch_one(pool)
    .await?)
}
