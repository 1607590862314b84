//! Library file queries
//!
//! A `library_files` row is the ground truth that a track has been acquired;
//! rows are keyed by filesystem path.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::LibraryFile;
use crate::{Error, Result};

const LIBRARY_COLUMNS: &str =
    "id, track_id, filepath, file_size, file_mtime, checksum_sha256, container, created_at";

pub async fn get_file(pool: &SqlitePool, id: i64) -> Result<LibraryFile> {
    sqlx::query_as::<_, LibraryFile>(&format!(
        "SELECT {LIBRARY_COLUMNS} FROM library_files WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("LibraryFile {id}")))
}

pub async fn list_files(
    pool: &SqlitePool,
    track_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<LibraryFile>> {
    let where_clause = if track_id.is_some() { "WHERE track_id = ?" } else { "" };
    let sql = format!(
        "SELECT {LIBRARY_COLUMNS} FROM library_files {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    let mut query = sqlx::query_as::<_, LibraryFile>(&sql);
    if let Some(track_id) = track_id {
        query = query.bind(track_id);
    }
    Ok(query.bind(limit).bind(offset).fetch_all(pool).await?)
}

pub async fn exists_for_track(pool: &SqlitePool, track_id: i64) -> Result<bool> {
    Ok(
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM library_files WHERE track_id = ?)")
            .bind(track_id)
            .fetch_one(pool)
            .await?,
    )
}

pub async fn latest_for_track(pool: &SqlitePool, track_id: i64) -> Result<Option<LibraryFile>> {
    Ok(sqlx::query_as::<_, LibraryFile>(&format!(
        "SELECT {LIBRARY_COLUMNS} FROM library_files WHERE track_id = ? \
         ORDER BY file_mtime DESC, id DESC LIMIT 1"
    ))
    .bind(track_id)
    .fetch_optional(pool)
    .await?)
}

/// Insert or refresh a row keyed by `filepath`
pub async fn upsert_by_filepath(
    pool: &SqlitePool,
    track_id: i64,
    filepath: &str,
    file_size: i64,
    file_mtime: DateTime<Utc>,
    checksum_sha256: &str,
    container: &str,
) -> Result<LibraryFile> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO library_files (track_id, filepath, file_size, file_mtime, checksum_sha256, container, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (filepath) DO UPDATE SET
            track_id = excluded.track_id,
            file_size = excluded.file_size,
            file_mtime = excluded.file_mtime,
            checksum_sha256 = excluded.checksum_sha256,
            container = excluded.container
        RETURNING id
        "#,
    )
    .bind(track_id)
    .bind(filepath)
    .bind(file_size)
    .bind(file_mtime)
    .bind(checksum_sha256)
    .bind(container)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    get_file(pool, id).await
}

pub async fn delete_file(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM library_files WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("LibraryFile {id}")));
    }
    Ok(())
}

pub async fn all_files(pool: &SqlitePool) -> Result<Vec<LibraryFile>> {
    Ok(sqlx::query_as::<_, LibraryFile>(&format!(
        "SELECT {LIBRARY_COLUMNS} FROM library_files ORDER BY id"
    ))
    .fetch_all(pool)
    .await?)
}
