//! Download job queries
//!
//! The table is the single authority for job state: workers re-read rows at
//! every transition and handlers never mutate in-memory copies.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{Download, DownloadStatus};
use crate::{Error, Result};

const DOWNLOAD_COLUMNS: &str = "id, track_id, candidate_id, provider, status, filepath, format, \
     filesize_bytes, checksum_sha256, error_message, started_at, finished_at, created_at";

pub async fn get_download(pool: &SqlitePool, id: i64) -> Result<Download> {
    sqlx::query_as::<_, Download>(&format!(
        "SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Download {id}")))
}

pub async fn list_downloads(
    pool: &SqlitePool,
    status: Option<DownloadStatus>,
    track_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Download>> {
    let mut sql = format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE 1=1");
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if track_id.is_some() {
        sql.push_str(" AND track_id = ?");
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, Download>(&sql);
    if let Some(status) = status {
        query = query.bind(status);
    }
    if let Some(track_id) = track_id {
        query = query.bind(track_id);
    }
    Ok(query.bind(limit).bind(offset).fetch_all(pool).await?)
}

/// Persist a new download row in the given initial status
pub async fn create_download(
    pool: &SqlitePool,
    track_id: i64,
    candidate_id: Option<i64>,
    status: DownloadStatus,
) -> Result<Download> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO downloads (track_id, candidate_id, provider, status, created_at)
        VALUES (?, ?, 'yt_dlp', ?, ?)
        RETURNING id
        "#,
    )
    .bind(track_id)
    .bind(candidate_id)
    .bind(status)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    get_download(pool, id).await
}

/// A track may have at most one non-terminal download at any time
pub async fn non_terminal_for_track(pool: &SqlitePool, track_id: i64) -> Result<Option<Download>> {
    Ok(sqlx::query_as::<_, Download>(&format!(
        "SELECT {DOWNLOAD_COLUMNS} FROM downloads \
         WHERE track_id = ? AND status IN ('queued', 'running') LIMIT 1"
    ))
    .bind(track_id)
    .fetch_optional(pool)
    .await?)
}

/// Conditional transition `queued -> running`; returns false when the row was
/// cancelled (or otherwise moved on) while waiting in the queue
pub async fn mark_running(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE downloads SET status = 'running', started_at = ? WHERE id = ? AND status = 'queued'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_done(
    pool: &SqlitePool,
    id: i64,
    filepath: &str,
    format: &str,
    filesize_bytes: i64,
    checksum_sha256: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE downloads
        SET status = 'done', filepath = ?, format = ?, filesize_bytes = ?, checksum_sha256 = ?,
            error_message = NULL, finished_at = ?
        WHERE id = ?
        "#,
    )
    .bind(filepath)
    .bind(format)
    .bind(filesize_bytes)
    .bind(checksum_sha256)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, id: i64, error_message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE downloads SET status = 'failed', error_message = ?, finished_at = ? WHERE id = ?",
    )
    .bind(error_message)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Conditional transition `queued -> skipped` used by cancel and stop-all.
/// Returns false when the job was not queued anymore.
pub async fn mark_skipped(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE downloads SET status = 'skipped', finished_at = ? WHERE id = ? AND status = 'queued'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Keep at most `keep` terminal rows, trimming oldest first. Queued and
/// running rows are never trimmed.
pub async fn trim_history(pool: &SqlitePool, keep: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM downloads
        WHERE status IN ('done', 'failed', 'skipped', 'already')
          AND id NOT IN (
              SELECT id FROM downloads
              WHERE status IN ('done', 'failed', 'skipped', 'already')
              ORDER BY created_at DESC, id DESC
              LIMIT ?
          )
        "#,
    )
    .bind(keep)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Whether the track failed a download within the last `within_hours`
pub async fn recently_failed(pool: &SqlitePool, track_id: i64, within_hours: i64) -> Result<bool> {
    let cutoff = Utc::now() - chrono::Duration::hours(within_hours);
    Ok(sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM downloads WHERE track_id = ? AND status = 'failed' AND finished_at > ?)",
    )
    .bind(track_id)
    .bind(cutoff)
    .fetch_one(pool)
    .await?)
}
