//! Search candidate queries
//!
//! The `chosen` flag is exclusive per track: flipping it on one candidate
//! clears it on every sibling inside a single transaction, so observers
//! never see two chosen rows.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{NewCandidate, SearchCandidate};
use crate::{Error, Result};

const CANDIDATE_COLUMNS: &str = "id, track_id, provider, external_id, url, title, channel, \
     duration_sec, score, chosen, score_breakdown, created_at";

pub async fn get_candidate(pool: &SqlitePool, id: i64) -> Result<SearchCandidate> {
    sqlx::query_as::<_, SearchCandidate>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM search_candidates WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Candidate {id}")))
}

pub async fn list_for_track(
    pool: &SqlitePool,
    track_id: i64,
    chosen_only: bool,
) -> Result<Vec<SearchCandidate>> {
    let where_clause = if chosen_only {
        "WHERE track_id = ? AND chosen = 1"
    } else {
        "WHERE track_id = ?"
    };
    Ok(sqlx::query_as::<_, SearchCandidate>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM search_candidates {where_clause} ORDER BY score DESC, id"
    ))
    .bind(track_id)
    .fetch_all(pool)
    .await?)
}

/// Insert or refresh a candidate keyed by `(track_id, provider, external_id)`
pub async fn upsert_candidate(pool: &SqlitePool, new: &NewCandidate) -> Result<SearchCandidate> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO search_candidates
            (track_id, provider, external_id, url, title, channel, duration_sec, score, score_breakdown, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (track_id, provider, external_id) DO UPDATE SET
            url = excluded.url,
            title = excluded.title,
            channel = excluded.channel,
            duration_sec = excluded.duration_sec,
            score = excluded.score,
            score_breakdown = excluded.score_breakdown
        RETURNING id
        "#,
    )
    .bind(new.track_id)
    .bind(new.provider)
    .bind(&new.external_id)
    .bind(&new.url)
    .bind(&new.title)
    .bind(&new.channel)
    .bind(new.duration_sec)
    .bind(new.score)
    .bind(&new.score_breakdown)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    get_candidate(pool, id).await
}

/// Atomically mark one candidate chosen and clear its siblings
pub async fn choose_candidate(pool: &SqlitePool, id: i64) -> Result<SearchCandidate> {
    let mut tx = pool.begin().await?;

    let track_id: Option<i64> =
        sqlx::query_scalar("SELECT track_id FROM search_candidates WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(track_id) = track_id else {
        return Err(Error::NotFound(format!("Candidate {id}")));
    };

    sqlx::query("UPDATE search_candidates SET chosen = (id = ?) WHERE track_id = ?")
        .bind(id)
        .bind(track_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    get_candidate(pool, id).await
}

pub async fn chosen_for_track(pool: &SqlitePool, track_id: i64) -> Result<Option<SearchCandidate>> {
    Ok(sqlx::query_as::<_, SearchCandidate>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM search_candidates WHERE track_id = ? AND chosen = 1"
    ))
    .bind(track_id)
    .fetch_optional(pool)
    .await?)
}

/// Best fallback when no candidate is explicitly chosen: chosen first, then
/// highest score
pub async fn best_for_track(pool: &SqlitePool, track_id: i64) -> Result<Option<SearchCandidate>> {
    Ok(sqlx::query_as::<_, SearchCandidate>(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM search_candidates WHERE track_id = ? \
         ORDER BY chosen DESC, score DESC, id LIMIT 1"
    ))
    .bind(track_id)
    .fetch_optional(pool)
    .await?)
}

pub async fn delete_candidate(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM search_candidates WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Candidate {id}")));
    }
    Ok(())
}
