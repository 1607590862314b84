//! Track identity queries

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{SourceProvider, TrackIdentity};
use crate::{Error, Result};

const IDENTITY_COLUMNS: &str =
    "id, track_id, provider, provider_track_id, provider_url, fingerprint, created_at, updated_at";

pub async fn list_for_track(pool: &SqlitePool, track_id: i64) -> Result<Vec<TrackIdentity>> {
    Ok(sqlx::query_as::<_, TrackIdentity>(&format!(
        "SELECT {IDENTITY_COLUMNS} FROM track_identities WHERE track_id = ? ORDER BY created_at DESC"
    ))
    .bind(track_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_identity(pool: &SqlitePool, id: i64) -> Result<TrackIdentity> {
    sqlx::query_as::<_, TrackIdentity>(&format!(
        "SELECT {IDENTITY_COLUMNS} FROM track_identities WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Identity {id}")))
}

/// Lookup by the `(provider, provider_track_id)` unique key
pub async fn find_by_provider_id(
    pool: &SqlitePool,
    provider: SourceProvider,
    provider_track_id: &str,
) -> Result<Option<TrackIdentity>> {
    Ok(sqlx::query_as::<_, TrackIdentity>(&format!(
        "SELECT {IDENTITY_COLUMNS} FROM track_identities WHERE provider = ? AND provider_track_id = ?"
    ))
    .bind(provider)
    .bind(provider_track_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn create_identity(
    pool: &SqlitePool,
    track_id: i64,
    provider: SourceProvider,
    provider_track_id: &str,
    provider_url: Option<&str>,
) -> Result<TrackIdentity> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO track_identities (track_id, provider, provider_track_id, provider_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(track_id)
    .bind(provider)
    .bind(provider_track_id)
    .bind(provider_url)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    get_identity(pool, id).await
}

/// Create the provider identity unless the unique key already exists
pub async fn ensure_identity(
    pool: &SqlitePool,
    track_id: i64,
    provider: SourceProvider,
    provider_track_id: &str,
    provider_url: Option<&str>,
) -> Result<TrackIdentity> {
    if let Some(existing) = find_by_provider_id(pool, provider, provider_track_id).await? {
        return Ok(existing);
    }
    create_identity(pool, track_id, provider, provider_track_id, provider_url).await
}

pub async fn delete_identity(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM track_identities WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Identity {id}")));
    }
    Ok(())
}
