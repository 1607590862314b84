//! Search candidate endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mixcrate_common::db::{self, NewCandidate, SearchCandidate};
use mixcrate_common::normalize::duration_delta_sec;
use mixcrate_common::Error;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CandidateListQuery {
    pub track_id: i64,
    #[serde(default)]
    pub chosen_only: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<CandidateListQuery>,
) -> ApiResult<Json<Vec<SearchCandidate>>> {
    Ok(Json(
        db::candidates::list_for_track(&state.db, query.track_id, query.chosen_only).await?,
    ))
}

/// A candidate with the duration delta against its track, for UI sorting
#[derive(Debug, Serialize)]
pub struct EnrichedCandidate {
    #[serde(flatten)]
    pub candidate: SearchCandidate,
    pub duration_delta_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct EnrichedQuery {
    pub track_id: i64,
    /// `score` (default) or `duration_delta`
    pub sort: Option<String>,
}

pub async fn enriched(
    State(state): State<AppState>,
    Query(query): Query<EnrichedQuery>,
) -> ApiResult<Json<Vec<EnrichedCandidate>>> {
    let track = db::tracks::get_track(&state.db, query.track_id).await?;
    let rows = db::candidates::list_for_track(&state.db, query.track_id, false).await?;
    let mut enriched: Vec<EnrichedCandidate> = rows
        .into_iter()
        .map(|candidate| {
            let delta =
                duration_delta_sec(track.duration_ms, candidate.duration_sec.map(|s| s * 1000));
            EnrichedCandidate { candidate, duration_delta_sec: delta }
        })
        .collect();

    if query.sort.as_deref() == Some("duration_delta") {
        enriched.sort_by(|a, b| {
            let key = |c: &EnrichedCandidate| (c.duration_delta_sec.is_none(), c.duration_delta_sec);
            key(a).partial_cmp(&key(b)).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    Ok(Json(enriched))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewCandidate>,
) -> ApiResult<Json<SearchCandidate>> {
    db::tracks::get_track(&state.db, payload.track_id).await?;
    if payload.external_id.trim().is_empty() || payload.url.trim().is_empty() {
        return Err(Error::InvalidInput("external_id and url are required".into()).into());
    }
    Ok(Json(db::candidates::upsert_candidate(&state.db, &payload).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(candidate_id): Path<i64>,
) -> ApiResult<Json<SearchCandidate>> {
    Ok(Json(db::candidates::get_candidate(&state.db, candidate_id).await?))
}

/// POST /candidates/{id}/choose - atomic sibling flip
pub async fn choose(
    State(state): State<AppState>,
    Path(candidate_id): Path<i64>,
) -> ApiResult<Json<SearchCandidate>> {
    Ok(Json(db::candidates::choose_candidate(&state.db, candidate_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(candidate_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    db::candidates::delete_candidate(&state.db, candidate_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
