//! Playlist endpoints: catalog views, bulk acquisition, Spotify sync

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use mixcrate_common::db::{self, Playlist, SourceProvider};
use mixcrate_common::db::playlists::{Membership, PlaylistEntry, PlaylistStats};
use mixcrate_common::Error;

use crate::error::ApiResult;
use crate::scheduler::AutoDownloadStarted;
use crate::spotify::{discover_playlists, sync_account, SyncSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaylistListQuery {
    #[serde(default)]
    pub selected_only: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PlaylistListQuery>,
) -> ApiResult<Json<Vec<Playlist>>> {
    Ok(Json(db::playlists::list_playlists(&state.db, query.selected_only).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistPayload {
    pub provider: SourceProvider,
    pub name: String,
    pub owner: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreatePlaylistPayload>,
) -> ApiResult<Json<Playlist>> {
    if payload.name.trim().is_empty() {
        return Err(Error::InvalidInput("name is required".into()).into());
    }
    Ok(Json(
        db::playlists::create_playlist(
            &state.db,
            payload.provider,
            &payload.name,
            payload.owner.as_deref(),
        )
        .await?,
    ))
}

pub async fn get(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
) -> ApiResult<Json<Playlist>> {
    Ok(Json(db::playlists::get_playlist(&state.db, playlist_id).await?))
}

pub async fn entries(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
) -> ApiResult<Json<Vec<PlaylistEntry>>> {
    db::playlists::get_playlist(&state.db, playlist_id).await?;
    Ok(Json(db::playlists::playlist_entries(&state.db, playlist_id).await?))
}

/// POST /playlists/{id}/auto_download - bulk acquisition; returns
/// immediately with the track count while the work happens detached
pub async fn auto_download(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
) -> ApiResult<Json<AutoDownloadStarted>> {
    Ok(Json(state.scheduler.auto_download(playlist_id).await?))
}

/// POST /playlists/{id}/retry_not_found - clear not-found annotations and
/// push those tracks through the bulk path again
pub async fn retry_not_found(
    State(state): State<AppState>,
    Path(playlist_id): Path<i64>,
) -> ApiResult<Json<AutoDownloadStarted>> {
    Ok(Json(state.scheduler.retry_not_found(playlist_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub selected_only: bool,
}

pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<Vec<PlaylistStats>>> {
    Ok(Json(db::playlists::playlist_stats(&state.db, query.selected_only).await?))
}

#[derive(Debug, Deserialize)]
pub struct MembershipsPayload {
    pub track_ids: Vec<i64>,
}

/// POST /playlists/memberships - batched membership lookup
pub async fn memberships(
    State(state): State<AppState>,
    Json(payload): Json<MembershipsPayload>,
) -> ApiResult<Json<Vec<Membership>>> {
    Ok(Json(db::playlists::memberships(&state.db, &payload.track_ids).await?))
}

// ============================================================================
// Spotify delegation
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub account_id: i64,
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscoveredPlaylist {
    pub provider_playlist_id: String,
    pub name: String,
    pub owner: Option<String>,
    pub snapshot: String,
}

/// GET /playlists/spotify/discover - list the account's playlists at the
/// provider, optionally persisting them
pub async fn spotify_discover(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> ApiResult<Json<Vec<DiscoveredPlaylist>>> {
    let remote = discover_playlists(
        &state.db,
        state.provider.as_ref(),
        &state.settings.secret_key,
        query.account_id,
        query.persist,
    )
    .await?;
    Ok(Json(
        remote
            .into_iter()
            .map(|p| DiscoveredPlaylist {
                provider_playlist_id: p.provider_playlist_id,
                name: p.name,
                owner: p.owner,
                snapshot: p.snapshot,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SelectPayload {
    pub account_id: i64,
    pub playlist_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub selected: u64,
}

/// POST /playlists/spotify/select - set-operation on the `selected` flag
pub async fn spotify_select(
    State(state): State<AppState>,
    Json(payload): Json<SelectPayload>,
) -> ApiResult<Json<SelectResponse>> {
    db::accounts::get_account(&state.db, payload.account_id).await?;
    let selected =
        db::playlists::select_playlists(&state.db, payload.account_id, &payload.playlist_ids)
            .await?;
    Ok(Json(SelectResponse { selected }))
}

#[derive(Debug, Deserialize)]
pub struct SyncPayload {
    pub account_id: i64,
    #[serde(default)]
    pub force: bool,
}

/// POST /playlists/spotify/sync - incremental snapshot-keyed sync
pub async fn spotify_sync(
    State(state): State<AppState>,
    Json(payload): Json<SyncPayload>,
) -> ApiResult<Json<SyncSummary>> {
    Ok(Json(
        sync_account(
            &state.db,
            state.provider.as_ref(),
            &state.settings.secret_key,
            payload.account_id,
            payload.force,
        )
        .await?,
    ))
}
