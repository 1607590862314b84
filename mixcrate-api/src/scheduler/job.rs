//! Per-job acquisition pipeline
//!
//! One download job: resolve the candidate, run the extractor, write tags
//! and cover art, set file timestamps from catalog data, reconcile the
//! library row, and land the job in a terminal state. Any error becomes a
//! `failed` row; the worker pool never sees a panic.
//!
//! Database mutations are short transactions; nothing is held across the
//! subprocess awaits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mixcrate_common::config::Settings;
use mixcrate_common::db::{self, Download, SearchCandidate, Track};
use mixcrate_common::{Error, Result};

use crate::extractor::{DownloadRequest, Extractor};
use crate::fs_times;
use crate::logbuf::LogBuffer;
use crate::tagger::Tagger;
use crate::util::{safe_filename, sha256_file};

pub struct JobContext {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub extractor: Arc<dyn Extractor>,
    pub tagger: Arc<Tagger>,
    pub logs: Arc<LogBuffer>,
    pub cancel: CancellationToken,
}

/// Execute one job to a terminal state. Returns the error that failed it,
/// after it has been recorded on the row.
pub async fn run_job(ctx: &JobContext, download_id: i64) -> Result<()> {
    // Re-read the row; a job cancelled while queued is dropped here
    if !db::downloads::mark_running(&ctx.db, download_id).await? {
        debug!(download_id, "Job no longer queued; dropping");
        return Ok(());
    }

    match execute(ctx, download_id).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            db::downloads::mark_failed(&ctx.db, download_id, &message).await?;
            ctx.logs.error(format!("Download {download_id} failed: {message}"));
            Err(e)
        }
    }
}

async fn execute(ctx: &JobContext, download_id: i64) -> Result<()> {
    let download = db::downloads::get_download(&ctx.db, download_id).await?;
    let track = db::tracks::get_track(&ctx.db, download.track_id).await?;
    let candidate = resolve_candidate(&ctx.db, &download).await?;

    ctx.logs.info(format!(
        "Download {download_id}: {} - {} via {}",
        track.artists, track.title, candidate.url
    ));

    // Test hook: hold the job in `running` for a configurable beat
    if ctx.settings.download_simulate_seconds > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(ctx.settings.download_simulate_seconds)).await;
    }

    let dest_base = resolve_destination(ctx, &track).await?;
    let request = DownloadRequest {
        url: candidate.url.clone(),
        dest_base,
        preferred_format: ctx.settings.preferred_audio_format.clone(),
        extractor_args: ctx.settings.extractor_args.clone(),
        cookies_file: ctx.settings.cookies_file.clone(),
        embed_thumbnail: ctx.settings.embed_thumbnail,
    };

    let outcome = ctx.extractor.download(&request).await?;

    // stop_all lets the extractor step finish, then the job reports failed
    if ctx.cancel.is_cancelled() {
        return Err(Error::Conflict("Cancelled by stop-all".into()));
    }

    ctx.tagger.tag_file(&outcome.filepath, &track).await?;

    // Tag and cover writes changed the bytes
    let checksum = sha256_file(&outcome.filepath)?;
    let file_size = std::fs::metadata(&outcome.filepath)?.len() as i64;

    let latest_added = db::tracks::latest_added_at(&ctx.db, track.id).await?;
    let times = fs_times::resolve_times(&track, latest_added);
    if let Err(e) = fs_times::apply_times(&outcome.filepath, times) {
        warn!(download_id, "Timestamp capability failed: {e}");
    }

    let filepath = outcome.filepath.to_string_lossy().to_string();
    reconcile_library(ctx, &track, &filepath, file_size, times.mtime, &checksum, &outcome.container)
        .await?;

    db::downloads::mark_done(
        &ctx.db,
        download_id,
        &filepath,
        &outcome.container,
        file_size,
        &checksum,
    )
    .await?;
    ctx.logs.info(format!("Download {download_id} done: {filepath}"));
    Ok(())
}

/// Explicit candidate, else the chosen one, else the best-scored fallback
async fn resolve_candidate(pool: &SqlitePool, download: &Download) -> Result<SearchCandidate> {
    if let Some(candidate_id) = download.candidate_id {
        return db::candidates::get_candidate(pool, candidate_id).await;
    }
    if let Some(chosen) = db::candidates::chosen_for_track(pool, download.track_id).await? {
        return Ok(chosen);
    }
    db::candidates::best_for_track(pool, download.track_id)
        .await?
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "NO_CANDIDATE: track {} has no search candidate",
                download.track_id
            ))
        })
}

/// Target path base `<artists> - <title>` in the library directory.
///
/// A previous library file for the same track is overwritten in place; a
/// clash with some other track's file gets a numeric suffix.
async fn resolve_destination(ctx: &JobContext, track: &Track) -> Result<PathBuf> {
    let lib_dir = &ctx.settings.library_dir;
    tokio::fs::create_dir_all(lib_dir).await?;

    if let Some(previous) = db::library::latest_for_track(&ctx.db, track.id).await? {
        let previous_path = PathBuf::from(&previous.filepath);
        return Ok(previous_path.with_extension(""));
    }

    let base_name = safe_filename(&format!("{} - {}", track.artists, track.title));
    let mut base = lib_dir.join(&base_name);
    let mut n = 1;
    while base_taken(&base) {
        n += 1;
        base = lib_dir.join(format!("{base_name} ({n})"));
    }
    Ok(base)
}

fn base_taken(base: &std::path::Path) -> bool {
    ["mp3", "m4a", "opus", "webm"]
        .iter()
        .any(|ext| base.with_extension(ext).exists())
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_library(
    ctx: &JobContext,
    track: &Track,
    filepath: &str,
    file_size: i64,
    mtime: chrono::DateTime<chrono::Utc>,
    checksum: &str,
    container: &str,
) -> Result<()> {
    // A re-download that switched container leaves a stale row and file
    // behind; clear them before upserting the new path
    if let Some(previous) = db::library::latest_for_track(&ctx.db, track.id).await? {
        if previous.filepath != filepath {
            let old = PathBuf::from(&previous.filepath);
            if old.exists() {
                if let Err(e) = std::fs::remove_file(&old) {
                    warn!("Could not remove replaced file {}: {e}", old.display());
                }
            }
            db::library::delete_file(&ctx.db, previous.id).await.ok();
        }
    }

    db::library::upsert_by_filepath(
        &ctx.db, track.id, filepath, file_size, mtime, checksum, container,
    )
    .await?;
    Ok(())
}
