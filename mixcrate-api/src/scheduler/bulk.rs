//! Bulk playlist acquisition
//!
//! `auto_download` walks a playlist and acquires every track that is not
//! already in the library: tracks without a chosen candidate get a bounded
//! parallel search first, then everything eligible is enqueued in playlist
//! order. The HTTP caller gets an immediate `processing` response; the rest
//! happens in a detached task.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use mixcrate_common::db::{self, DownloadStatus, SearchProvider, Track};
use mixcrate_common::{Error, Result};

use crate::search::search_and_rank;

use super::DownloadScheduler;

/// How many ranked candidates the bulk search persists per track
const PERSIST_TOP_K: usize = 5;

/// Recent-failure window that keeps a track out of the bulk path
const RECENT_FAILURE_HOURS: i64 = 24;

/// Immediate response for the HTTP caller
#[derive(Debug, Clone, Serialize)]
pub struct AutoDownloadStarted {
    pub status: &'static str,
    pub playlist_id: i64,
    pub total_tracks: usize,
}

/// Summary of a finished bulk run (logged, and returned by tests that await
/// the task directly)
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    pub enqueued: usize,
    pub already: usize,
    pub searched_not_found: usize,
    pub failed: usize,
    pub skipped_recent_failure: usize,
}

impl DownloadScheduler {
    /// Kick off bulk acquisition for a playlist; returns immediately
    pub async fn auto_download(self: &Arc<Self>, playlist_id: i64) -> Result<AutoDownloadStarted> {
        db::playlists::get_playlist(&self.db, playlist_id).await?;
        let entries = db::playlists::playlist_entries(&self.db, playlist_id).await?;
        let total_tracks = entries.len();
        let tracks: Vec<Track> = entries.into_iter().map(|e| e.track).collect();

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = scheduler.run_bulk(tracks).await;
            info!(playlist_id, ?outcome, "Auto-download finished");
            scheduler.logs.info(format!(
                "Playlist {playlist_id}: auto-download finished \
                 (enqueued {}, already {}, not found {}, failed {})",
                outcome.enqueued, outcome.already, outcome.searched_not_found, outcome.failed
            ));
        });

        Ok(AutoDownloadStarted {
            status: "processing",
            playlist_id,
            total_tracks,
        })
    }

    /// Clear `searched_not_found` annotations for a playlist and retry those
    /// tracks through the bulk path
    pub async fn retry_not_found(self: &Arc<Self>, playlist_id: i64) -> Result<AutoDownloadStarted> {
        db::playlists::get_playlist(&self.db, playlist_id).await?;
        let entries = db::playlists::playlist_entries(&self.db, playlist_id).await?;
        let mut tracks: Vec<Track> = entries
            .into_iter()
            .map(|e| e.track)
            .filter(|t| t.searched_not_found)
            .collect();
        for track in tracks.iter_mut() {
            db::tracks::set_searched_not_found(&self.db, track.id, false).await?;
            // The snapshot must match, or the search phase would skip them
            track.searched_not_found = false;
        }
        let total_tracks = tracks.len();

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = scheduler.run_bulk(tracks).await;
            info!(playlist_id, ?outcome, "Retry of not-found tracks finished");
        });

        Ok(AutoDownloadStarted {
            status: "processing",
            playlist_id,
            total_tracks,
        })
    }

    /// The bulk body: bounded parallel searches, then in-order enqueue
    pub(crate) async fn run_bulk(self: &Arc<Self>, tracks: Vec<Track>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        // Phase 1: searches for tracks without a chosen candidate, bounded
        // by the search semaphore so the extractor is not flooded
        let mut search_tasks = Vec::new();
        for track in tracks.clone() {
            let scheduler = Arc::clone(self);
            search_tasks.push(tokio::spawn(async move {
                scheduler.search_and_choose(track).await
            }));
        }
        let mut not_found = 0usize;
        for task in search_tasks {
            match task.await {
                Ok(Ok(chose)) => {
                    if !chose {
                        not_found += 1;
                    }
                }
                Ok(Err(e)) => warn!("Bulk search failed: {e}"),
                Err(e) => warn!("Bulk search task panicked: {e}"),
            }
        }
        outcome.searched_not_found = not_found;

        // Phase 2: enqueue in playlist order
        for track in tracks {
            match self.bulk_enqueue_one(&track).await {
                Ok(BulkStep::Enqueued) => outcome.enqueued += 1,
                Ok(BulkStep::Already) => outcome.already += 1,
                Ok(BulkStep::NotFound) => {}
                Ok(BulkStep::RecentFailure) => outcome.skipped_recent_failure += 1,
                Err(e) => {
                    warn!(track_id = track.id, "Bulk enqueue failed: {e}");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Ensure a chosen candidate exists for the track, searching when needed.
    /// Returns false when the search came up below the auto-choose bar.
    async fn search_and_choose(self: &Arc<Self>, track: Track) -> Result<bool> {
        if db::library::exists_for_track(&self.db, track.id).await?
            || db::candidates::chosen_for_track(&self.db, track.id).await?.is_some()
            || track.searched_not_found
        {
            return Ok(true);
        }

        let _permit = self
            .search_permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("Search semaphore closed".into()))?;

        let ranked =
            search_and_rank(self.extractor.as_ref(), &self.ranking, &self.settings, &track, false, None)
                .await?;

        let Some(top) = ranked.first() else {
            db::tracks::set_searched_not_found(&self.db, track.id, true).await?;
            self.logs.warn(format!("Track {}: search returned nothing", track.id));
            return Ok(false);
        };
        if top.total() < self.settings.min_autochoose_score {
            db::tracks::set_searched_not_found(&self.db, track.id, true).await?;
            self.logs.warn(format!(
                "Track {}: best score {:.1} below auto-choose threshold {:.1}",
                track.id,
                top.total(),
                self.settings.min_autochoose_score
            ));
            return Ok(false);
        }

        let mut top_id = None;
        for ranked_candidate in ranked.iter().take(PERSIST_TOP_K) {
            let row = db::candidates::upsert_candidate(
                &self.db,
                &db::NewCandidate {
                    track_id: track.id,
                    provider: SearchProvider::Youtube,
                    external_id: ranked_candidate.candidate.external_id.clone(),
                    url: ranked_candidate.candidate.url.clone(),
                    title: ranked_candidate.candidate.title.clone(),
                    channel: ranked_candidate.candidate.channel.clone(),
                    duration_sec: ranked_candidate.candidate.duration_sec,
                    score: ranked_candidate.total(),
                    score_breakdown: Some(ranked_candidate.breakdown.to_value().to_string()),
                },
            )
            .await?;
            if top_id.is_none() {
                top_id = Some(row.id);
            }
        }
        if let Some(id) = top_id {
            db::candidates::choose_candidate(&self.db, id).await?;
        }
        Ok(true)
    }

    async fn bulk_enqueue_one(self: &Arc<Self>, track: &Track) -> Result<BulkStep> {
        if db::library::exists_for_track(&self.db, track.id).await? {
            return Ok(BulkStep::Already);
        }
        let fresh = db::tracks::get_track(&self.db, track.id).await?;
        if fresh.searched_not_found {
            return Ok(BulkStep::NotFound);
        }
        if db::downloads::recently_failed(&self.db, track.id, RECENT_FAILURE_HOURS).await? {
            return Ok(BulkStep::RecentFailure);
        }
        match self.enqueue(track.id, None, false).await {
            Ok(row) if row.status == DownloadStatus::Already => Ok(BulkStep::Already),
            Ok(_) => Ok(BulkStep::Enqueued),
            Err(e) => Err(e),
        }
    }
}

enum BulkStep {
    Enqueued,
    Already,
    NotFound,
    RecentFailure,
}
