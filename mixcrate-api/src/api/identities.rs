//! Track identity endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use mixcrate_common::db::{self, SourceProvider, TrackIdentity};
use mixcrate_common::Error;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IdentityListQuery {
    pub track_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IdentityPayload {
    pub track_id: i64,
    pub provider: SourceProvider,
    pub provider_track_id: String,
    pub provider_url: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<IdentityListQuery>,
) -> ApiResult<Json<Vec<TrackIdentity>>> {
    match query.track_id {
        Some(track_id) => Ok(Json(db::identities::list_for_track(&state.db, track_id).await?)),
        None => Err(Error::InvalidInput("track_id query parameter is required".into()).into()),
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<IdentityPayload>,
) -> ApiResult<Json<TrackIdentity>> {
    db::tracks::get_track(&state.db, payload.track_id).await?;
    Ok(Json(
        db::identities::create_identity(
            &state.db,
            payload.track_id,
            payload.provider,
            &payload.provider_track_id,
            payload.provider_url.as_deref(),
        )
        .await?,
    ))
}

pub async fn get(
    State(state): State<AppState>,
    Path(identity_id): Path<i64>,
) -> ApiResult<Json<TrackIdentity>> {
    Ok(Json(db::identities::get_identity(&state.db, identity_id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(identity_id): Path<i64>,
    Json(payload): Json<IdentityPayload>,
) -> ApiResult<Json<TrackIdentity>> {
    // Replace-in-place: the unique key may change, so delete + recreate
    db::identities::get_identity(&state.db, identity_id).await?;
    db::tracks::get_track(&state.db, payload.track_id).await?;
    db::identities::delete_identity(&state.db, identity_id).await?;
    Ok(Json(
        db::identities::create_identity(
            &state.db,
            payload.track_id,
            payload.provider,
            &payload.provider_track_id,
            payload.provider_url.as_deref(),
        )
        .await?,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(identity_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    db::identities::delete_identity(&state.db, identity_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
