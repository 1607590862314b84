//! Download endpoints: enqueue, cancel, worker lifecycle, introspection

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use mixcrate_common::db::{self, Download, DownloadStatus, Track};

use crate::error::ApiResult;
use crate::logbuf::LogEntry;
use crate::scheduler::SchedulerStatus;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueQuery {
    pub track_id: i64,
    pub candidate_id: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

/// POST /downloads/enqueue - queue one download.
///
/// Duplicate prevention without `force` records an `already` row; `force`
/// against a running job is refused with 409.
pub async fn enqueue(
    State(state): State<AppState>,
    Query(query): Query<EnqueueQuery>,
) -> ApiResult<Json<Download>> {
    Ok(Json(
        state
            .scheduler
            .enqueue(query.track_id, query.candidate_id, query.force)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub download_id: i64,
    pub status: DownloadStatus,
}

/// POST /downloads/cancel/{id} - cancel a queued job. Cancelling a job that
/// already reached a terminal state is a no-op; a running job is a 409.
pub async fn cancel(
    State(state): State<AppState>,
    Path(download_id): Path<i64>,
) -> ApiResult<Json<CancelResponse>> {
    state.scheduler.cancel(download_id).await?;
    let download = db::downloads::get_download(&state.db, download_id).await?;
    Ok(Json(CancelResponse { download_id, status: download.status }))
}

#[derive(Debug, Serialize)]
pub struct StopAllResponse {
    pub stopped: bool,
    pub skipped: usize,
}

/// POST /downloads/stop_all - drain queued jobs as skipped and stop the pool
pub async fn stop_all(State(state): State<AppState>) -> ApiResult<Json<StopAllResponse>> {
    let skipped = state.scheduler.stop_all().await?;
    Ok(Json(StopAllResponse { stopped: true, skipped }))
}

#[derive(Debug, Serialize)]
pub struct RestartResponse {
    pub restarted: bool,
    pub status: SchedulerStatus,
}

/// POST /downloads/restart_worker - bring a fresh worker pool up
pub async fn restart_worker(State(state): State<AppState>) -> ApiResult<Json<RestartResponse>> {
    state.scheduler.restart().await?;
    Ok(Json(RestartResponse { restarted: true, status: state.scheduler.status() }))
}

/// GET /downloads/status - worker pool introspection
pub async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
    pub entries: Vec<LogEntry>,
}

/// GET /downloads/logs - bounded snapshot of the scheduler's ring buffer
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let entries = state.scheduler.logs().snapshot(query.count);
    let lines = entries.iter().map(LogEntry::format).collect();
    Json(LogsResponse { lines, entries })
}

#[derive(Debug, Deserialize)]
pub struct DownloadListQuery {
    pub status: Option<DownloadStatus>,
    pub track_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<DownloadListQuery>,
) -> ApiResult<Json<Vec<Download>>> {
    Ok(Json(
        db::downloads::list_downloads(
            &state.db,
            query.status,
            query.track_id,
            query.limit.clamp(1, 500),
            query.offset.max(0),
        )
        .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct DownloadWithTrack {
    #[serde(flatten)]
    pub download: Download,
    pub track: Option<Track>,
}

pub async fn list_with_tracks(
    State(state): State<AppState>,
    Query(query): Query<DownloadListQuery>,
) -> ApiResult<Json<Vec<DownloadWithTrack>>> {
    let downloads = db::downloads::list_downloads(
        &state.db,
        query.status,
        query.track_id,
        query.limit.clamp(1, 500),
        query.offset.max(0),
    )
    .await?;

    let mut joined = Vec::with_capacity(downloads.len());
    for download in downloads {
        let track = db::tracks::get_track(&state.db, download.track_id).await.ok();
        joined.push(DownloadWithTrack { download, track });
    }
    Ok(Json(joined))
}

pub async fn get(
    State(state): State<AppState>,
    Path(download_id): Path<i64>,
) -> ApiResult<Json<Download>> {
    Ok(Json(db::downloads::get_download(&state.db, download_id).await?))
}
