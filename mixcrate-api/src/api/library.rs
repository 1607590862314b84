//! Library file endpoints: listing, serving with HTTP range support, and
//! disk <-> catalog reconciliation

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use mixcrate_common::db::{self, LibraryFile};
use mixcrate_common::normalize::normalize_track;
use mixcrate_common::{Error, Result};

use crate::error::{ApiError, ApiResult};
use crate::api::range::{audio_mime, parse_range};
use crate::util::{safe_filename, sha256_file};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LibraryListQuery {
    pub track_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<LibraryListQuery>,
) -> ApiResult<Json<Vec<LibraryFile>>> {
    Ok(Json(
        db::library::list_files(
            &state.db,
            query.track_id,
            query.limit.clamp(1, 500),
            query.offset.max(0),
        )
        .await?,
    ))
}

pub async fn get(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> ApiResult<Json<LibraryFile>> {
    Ok(Json(db::library::get_file(&state.db, file_id).await?))
}

/// DELETE /library/files/{id} - remove the row; the on-disk file removal is
/// best-effort
pub async fn delete(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let file = db::library::get_file(&state.db, file_id).await?;
    let path = PathBuf::from(&file.filepath);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Could not remove {}: {e}", path.display());
        }
    }
    db::library::delete_file(&state.db, file_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn resolve_on_disk(state: &AppState, file_id: i64) -> Result<(LibraryFile, PathBuf)> {
    let file = db::library::get_file(&state.db, file_id).await?;
    let path = PathBuf::from(&file.filepath);
    if !path.is_file() {
        return Err(Error::NotFound(format!("File missing on disk: {}", file.filepath)));
    }
    Ok((file, path))
}

fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn file_mtime(path: &FsPath) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

/// GET /library/files/{id}/download - attachment download
pub async fn download(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> ApiResult<Response> {
    let (_file, path) = resolve_on_disk(&state, file_id).await?;
    let body = tokio::fs::read(&path).await.map_err(Error::from)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(body.into())
        .map_err(|e| Error::Internal(e.to_string()))?)
}

/// GET /library/files/{id}/stream - serve audio with byte-range support.
///
/// Unranged requests get a 200 with the full body; `Range: bytes=..` gets a
/// 206 with an exact `Content-Range`. The ETag is strong, derived from size
/// and mtime.
pub async fn stream(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let (file, path) = resolve_on_disk(&state, file_id).await?;
    let metadata = std::fs::metadata(&path).map_err(Error::from)?;
    let total = metadata.len();
    let mtime = file_mtime(&path);
    let etag = format!("\"{:x}-{:x}\"", total, mtime.timestamp());
    let mime = audio_mime(&file.filepath);

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    let range = match parse_range(range_header, total) {
        Ok(range) => range,
        Err(_) => {
            // Unsatisfiable or malformed: 416 with the total size
            return Ok(Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{total}"))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(axum::body::Body::empty())
                .map_err(|e| ApiError(Error::Internal(e.to_string())))?);
        }
    };

    match range {
        None => {
            let body = tokio::fs::read(&path).await.map_err(Error::from)?;
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, total)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::ETAG, etag)
                .header(header::LAST_MODIFIED, http_date(mtime))
                .body(body.into())
                .map_err(|e| Error::Internal(e.to_string()))?)
        }
        Some(range) => {
            use tokio::io::{AsyncReadExt, AsyncSeekExt};
            let mut handle = tokio::fs::File::open(&path).await.map_err(Error::from)?;
            handle
                .seek(std::io::SeekFrom::Start(range.start))
                .await
                .map_err(Error::from)?;
            let mut body = vec![0u8; range.len() as usize];
            handle.read_exact(&mut body).await.map_err(Error::from)?;

            Ok(Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, range.len())
                .header(header::CONTENT_RANGE, range.content_range(total))
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::ETAG, etag)
                .header(header::LAST_MODIFIED, http_date(mtime))
                .body(body.into())
                .map_err(|e| Error::Internal(e.to_string()))?)
        }
    }
}

/// POST /library/files/{id}/reveal - open the platform file manager with the
/// file selected. 501 where unsupported.
pub async fn reveal(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let (_file, path) = resolve_on_disk(&state, file_id).await?;
    reveal_in_file_manager(&path)?;
    Ok(Json(serde_json::json!({ "ok": true, "path": path.to_string_lossy() })))
}

#[cfg(target_os = "windows")]
fn reveal_in_file_manager(path: &FsPath) -> Result<()> {
    std::process::Command::new("explorer")
        .arg("/select,")
        .arg(path)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to open Explorer: {e}")))?;
    Ok(())
}

#[cfg(target_os = "macos")]
fn reveal_in_file_manager(path: &FsPath) -> Result<()> {
    std::process::Command::new("open")
        .arg("-R")
        .arg(path)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to open Finder: {e}")))?;
    Ok(())
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn reveal_in_file_manager(_path: &FsPath) -> Result<()> {
    Err(Error::InvalidInput(
        "Reveal is not supported on this platform".into(),
    ))
}

// ============================================================================
// Disk <-> catalog reconciliation
// ============================================================================

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "webm", "flac", "ogg", "wav"];

fn is_audio_path(path: &FsPath) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub files_seen: usize,
    pub matched: usize,
    pub created: usize,
    pub orphans: Vec<String>,
}

/// POST /library/files/scan - walk the library directory, matching untracked
/// files to tracks via the `<artists> - <title>` naming convention
pub async fn scan(State(state): State<AppState>) -> ApiResult<Json<ScanResponse>> {
    let mut response = ScanResponse {
        files_seen: 0,
        matched: 0,
        created: 0,
        orphans: Vec::new(),
    };

    let dir = &state.settings.library_dir;
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(Json(response)),
    };

    let known: std::collections::HashSet<String> = db::library::all_files(&state.db)
        .await?
        .into_iter()
        .map(|f| f.filepath)
        .collect();

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_audio_path(&path) {
            continue;
        }
        response.files_seen += 1;
        let filepath = path.to_string_lossy().to_string();

        if known.contains(&filepath) {
            response.matched += 1;
            continue;
        }

        // "<artists> - <title>[ (n)]" back to a catalog lookup
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let base = stem
            .rsplit_once(" (")
            .filter(|(_, suffix)| suffix.trim_end_matches(')').parse::<u32>().is_ok())
            .map(|(base, _)| base)
            .unwrap_or(stem);
        let Some((artists, title)) = base.split_once(" - ") else {
            response.orphans.push(filepath);
            continue;
        };
        let norm = normalize_track(artists, title);
        let Some(track) = db::tracks::find_by_normalized(
            &state.db,
            &norm.normalized_artists,
            &norm.normalized_title,
        )
        .await?
        else {
            response.orphans.push(filepath);
            continue;
        };

        let metadata = std::fs::metadata(&path).map_err(Error::from)?;
        let checksum = sha256_file(&path)?;
        let container = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();
        db::library::upsert_by_filepath(
            &state.db,
            track.id,
            &filepath,
            metadata.len() as i64,
            file_mtime(&path),
            &checksum,
            &container,
        )
        .await?;
        response.matched += 1;
        response.created += 1;
    }

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub tracks_checked: usize,
    pub files_found: usize,
}

/// POST /library/files/reindex_from_tracks - probe each track's expected
/// path on disk and register hits
pub async fn reindex_from_tracks(State(state): State<AppState>) -> ApiResult<Json<ReindexResponse>> {
    let tracks = db::tracks::list_tracks(&state.db, 10_000, 0).await?;
    let mut response = ReindexResponse { tracks_checked: 0, files_found: 0 };

    for track in tracks {
        response.tracks_checked += 1;
        let base_name = safe_filename(&format!("{} - {}", track.artists, track.title));
        for ext in AUDIO_EXTENSIONS {
            let path = state.settings.library_dir.join(format!("{base_name}.{ext}"));
            if path.is_file() {
                let metadata = std::fs::metadata(&path).map_err(Error::from)?;
                let checksum = sha256_file(&path)?;
                db::library::upsert_by_filepath(
                    &state.db,
                    track.id,
                    &path.to_string_lossy(),
                    metadata.len() as i64,
                    file_mtime(&path),
                    &checksum,
                    ext,
                )
                .await?;
                response.files_found += 1;
                break;
            }
        }
    }
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct ResyncResponse {
    pub rows_checked: usize,
    pub removed: usize,
    pub updated: usize,
}

/// POST /library/files/resync - drop rows whose file vanished and refresh
/// size/mtime/checksum for the rest
pub async fn resync(State(state): State<AppState>) -> ApiResult<Json<ResyncResponse>> {
    let files = db::library::all_files(&state.db).await?;
    let mut response = ResyncResponse { rows_checked: 0, removed: 0, updated: 0 };

    for file in files {
        response.rows_checked += 1;
        let path = PathBuf::from(&file.filepath);
        if !path.is_file() {
            db::library::delete_file(&state.db, file.id).await?;
            response.removed += 1;
            continue;
        }
        let metadata = std::fs::metadata(&path).map_err(Error::from)?;
        let size = metadata.len() as i64;
        let mtime = file_mtime(&path);
        let mtime_changed =
            file.file_mtime.map(|t| t.timestamp()) != Some(mtime.timestamp());
        if file.file_size != Some(size) || mtime_changed {
            let checksum = sha256_file(&path)?;
            db::library::upsert_by_filepath(
                &state.db,
                file.track_id,
                &file.filepath,
                size,
                mtime,
                &checksum,
                &file.container,
            )
            .await?;
            response.updated += 1;
        }
    }
    Ok(Json(response))
}
