//! Playlist and membership queries

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::models::{Playlist, PlaylistTrack, SourceProvider, Track};
use crate::{Error, Result};

const PLAYLIST_COLUMNS: &str = "id, source_account_id, provider, provider_playlist_id, name, \
     description, owner, snapshot, selected, created_at, updated_at";

pub async fn get_playlist(pool: &SqlitePool, id: i64) -> Result<Playlist> {
    sqlx::query_as::<_, Playlist>(&format!(
        "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Playlist {id}")))
}

pub async fn list_playlists(pool: &SqlitePool, selected_only: bool) -> Result<Vec<Playlist>> {
    let where_clause = if selected_only { "WHERE selected = 1" } else { "" };
    Ok(sqlx::query_as::<_, Playlist>(&format!(
        "SELECT {PLAYLIST_COLUMNS} FROM playlists {where_clause} ORDER BY name, id"
    ))
    .fetch_all(pool)
    .await?)
}

pub async fn create_playlist(
    pool: &SqlitePool,
    provider: SourceProvider,
    name: &str,
    owner: Option<&str>,
) -> Result<Playlist> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO playlists (provider, name, owner, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(provider)
    .bind(name)
    .bind(owner)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    get_playlist(pool, id).await
}

/// Insert or refresh a provider-sourced playlist keyed by
/// `(provider, provider_playlist_id)`. The snapshot is NOT written here; sync
/// records it only after membership reconciliation succeeds.
pub async fn upsert_provider_playlist(
    pool: &SqlitePool,
    source_account_id: i64,
    provider: SourceProvider,
    provider_playlist_id: &str,
    name: &str,
    owner: Option<&str>,
) -> Result<Playlist> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO playlists (source_account_id, provider, provider_playlist_id, name, owner, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (provider, provider_playlist_id) DO UPDATE SET
            source_account_id = excluded.source_account_id,
            name = excluded.name,
            owner = excluded.owner,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(source_account_id)
    .bind(provider)
    .bind(provider_playlist_id)
    .bind(name)
    .bind(owner)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    get_playlist(pool, id).await
}

pub async fn set_snapshot(pool: &SqlitePool, id: i64, snapshot: &str) -> Result<()> {
    sqlx::query("UPDATE playlists SET snapshot = ?, updated_at = ? WHERE id = ?")
        .bind(snapshot)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Set-operation selection: exactly the given playlists of the account end up
/// `selected`, all its others are cleared
pub async fn select_playlists(
    pool: &SqlitePool,
    source_account_id: i64,
    playlist_ids: &[i64],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE playlists SET selected = 0 WHERE source_account_id = ?")
        .bind(source_account_id)
        .execute(&mut *tx)
        .await?;
    let mut selected = 0;
    for id in playlist_ids {
        let result =
            sqlx::query("UPDATE playlists SET selected = 1 WHERE id = ? AND source_account_id = ?")
                .bind(id)
                .bind(source_account_id)
                .execute(&mut *tx)
                .await?;
        selected += result.rows_affected();
    }
    tx.commit().await?;
    Ok(selected)
}

/// A playlist entry joined with its track, ordered by playlist position
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlaylistEntry {
    pub link_id: i64,
    pub position: Option<i64>,
    pub added_at: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub track: Track,
}

pub async fn playlist_entries(pool: &SqlitePool, playlist_id: i64) -> Result<Vec<PlaylistEntry>> {
    Ok(sqlx::query_as::<_, PlaylistEntry>(
        r#"
        SELECT pt.id AS link_id, pt.position, pt.added_at,
               t.id, t.title, t.artists, t.album, t.genre, t.bpm, t.duration_ms, t.isrc, t.year,
               t.release_date, t.spotify_added_at, t.explicit, t.cover_url,
               t.normalized_title, t.normalized_artists, t.searched_not_found,
               t.created_at, t.updated_at
        FROM playlist_tracks pt
        JOIN tracks t ON t.id = pt.track_id
        WHERE pt.playlist_id = ?
        ORDER BY pt.position IS NULL, pt.position, pt.id
        "#,
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?)
}

/// Idempotent link creation; an existing link gets position/added_at updates
pub async fn upsert_link(
    pool: &SqlitePool,
    playlist_id: i64,
    track_id: i64,
    position: Option<i64>,
    added_at: Option<DateTime<Utc>>,
) -> Result<(PlaylistTrack, bool)> {
    let existing = sqlx::query_as::<_, PlaylistTrack>(
        "SELECT id, playlist_id, track_id, position, added_at FROM playlist_tracks \
         WHERE playlist_id = ? AND track_id = ?",
    )
    .bind(playlist_id)
    .bind(track_id)
    .fetch_optional(pool)
    .await?;

    if let Some(link) = existing {
        sqlx::query(
            "UPDATE playlist_tracks SET position = COALESCE(?, position), added_at = COALESCE(?, added_at) WHERE id = ?",
        )
        .bind(position)
        .bind(added_at)
        .bind(link.id)
        .execute(pool)
        .await?;
        let refreshed = sqlx::query_as::<_, PlaylistTrack>(
            "SELECT id, playlist_id, track_id, position, added_at FROM playlist_tracks WHERE id = ?",
        )
        .bind(link.id)
        .fetch_one(pool)
        .await?;
        return Ok((refreshed, false));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO playlist_tracks (playlist_id, track_id, position, added_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(playlist_id)
    .bind(track_id)
    .bind(position)
    .bind(added_at)
    .fetch_one(pool)
    .await?;
    let link = sqlx::query_as::<_, PlaylistTrack>(
        "SELECT id, playlist_id, track_id, position, added_at FROM playlist_tracks WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok((link, true))
}

/// Remove links whose track is no longer in the provider's playlist; link
/// removal never cascades to the track itself
pub async fn remove_links_not_in(
    pool: &SqlitePool,
    playlist_id: i64,
    keep_track_ids: &[i64],
) -> Result<u64> {
    if keep_track_ids.is_empty() {
        let result = sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(pool)
            .await?;
        return Ok(result.rows_affected());
    }
    let placeholders = vec!["?"; keep_track_ids.len()].join(", ");
    let sql = format!(
        "DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_id NOT IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(playlist_id);
    for id in keep_track_ids {
        query = query.bind(id);
    }
    Ok(query.execute(pool).await?.rows_affected())
}

/// Per-playlist acquisition progress
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlaylistStats {
    pub playlist_id: i64,
    pub name: String,
    pub selected: bool,
    pub total_tracks: i64,
    pub downloaded: i64,
    pub not_found: i64,
}

pub async fn playlist_stats(pool: &SqlitePool, selected_only: bool) -> Result<Vec<PlaylistStats>> {
    let where_clause = if selected_only { "WHERE p.selected = 1" } else { "" };
    Ok(sqlx::query_as::<_, PlaylistStats>(&format!(
        r#"
        SELECT p.id AS playlist_id, p.name, p.selected,
               COUNT(pt.id) AS total_tracks,
               COUNT(DISTINCT lf.track_id) AS downloaded,
               COALESCE(SUM(CASE WHEN t.searched_not_found THEN 1 ELSE 0 END), 0) AS not_found
        FROM playlists p
        LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
        LEFT JOIN tracks t ON t.id = pt.track_id
        LEFT JOIN library_files lf ON lf.track_id = pt.track_id
        {where_clause}
        GROUP BY p.id
        ORDER BY p.name, p.id
        "#
    ))
    .fetch_all(pool)
    .await?)
}

/// Batched membership lookup: which playlists contain each given track
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Membership {
    pub track_id: i64,
    pub playlist_id: i64,
    pub playlist_name: String,
}

pub async fn memberships(pool: &SqlitePool, track_ids: &[i64]) -> Result<Vec<Membership>> {
    if track_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; track_ids.len()].join(", ");
    let sql = format!(
        r#"
        SELECT pt.track_id, p.id AS playlist_id, p.name AS playlist_name
        FROM playlist_tracks pt
        JOIN playlists p ON p.id = pt.playlist_id
        WHERE pt.track_id IN ({placeholders})
        ORDER BY pt.track_id, p.name
        "#
    );
    let mut query = sqlx::query_as::<_, Membership>(&sql);
    for id in track_ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}
