//! Download scheduler
//!
//! A single-process worker pool over a FIFO queue of download row ids. The
//! scheduler is an owned component with an explicit lifecycle: `start` spawns
//! the workers, `stop_all` drains the queue and stops accepting work,
//! `restart` brings a fresh pool up. Handlers receive it as a dependency;
//! there is no global state.
//!
//! The database is the single authority for job state. The in-memory queue
//! only carries row ids; every transition re-reads the row, so a job
//! cancelled while queued is dropped on pop.

mod bulk;
mod job;

pub use bulk::{AutoDownloadStarted, BulkOutcome};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mixcrate_common::config::Settings;
use mixcrate_common::db::{self, Download, DownloadStatus};
use mixcrate_common::{Error, Result};

use crate::extractor::Extractor;
use crate::logbuf::LogBuffer;
use crate::ranking::RankingService;
use crate::tagger::Tagger;

/// Outcome of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Job was queued and is now skipped
    Skipped,
    /// Job already reached a terminal state; cancelling again is a no-op
    NoOp,
}

/// Worker pool introspection for the operator dashboard
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub worker_running: bool,
    pub queue_size: usize,
    pub active_tasks: usize,
    pub concurrency: usize,
}

struct PoolState {
    queue: VecDeque<i64>,
    accepting: bool,
    workers: Vec<tokio::task::JoinHandle<()>>,
    cancel: CancellationToken,
}

pub struct DownloadScheduler {
    db: SqlitePool,
    settings: Arc<Settings>,
    extractor: Arc<dyn Extractor>,
    ranking: Arc<RankingService>,
    tagger: Arc<Tagger>,
    logs: Arc<LogBuffer>,
    state: Mutex<PoolState>,
    notify: Notify,
    active: AtomicUsize,
    /// Bounds bulk-path searches independently of download concurrency
    search_permits: Arc<Semaphore>,
}

impl DownloadScheduler {
    pub fn new(
        db: SqlitePool,
        settings: Arc<Settings>,
        extractor: Arc<dyn Extractor>,
        ranking: Arc<RankingService>,
        logs: Arc<LogBuffer>,
    ) -> Arc<Self> {
        let search_permits = Arc::new(Semaphore::new(settings.search_concurrency));
        Arc::new(Self {
            db,
            settings,
            extractor,
            ranking,
            tagger: Arc::new(Tagger::new()),
            logs,
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                accepting: true,
                workers: Vec::new(),
                cancel: CancellationToken::new(),
            }),
            notify: Notify::new(),
            active: AtomicUsize::new(0),
            search_permits,
        })
    }

    pub fn logs(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    pub fn ranking(&self) -> &Arc<RankingService> {
        &self.ranking
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// Spawn the worker pool. Idempotent: a running pool is left alone.
    pub fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("scheduler state poisoned");
        state.workers.retain(|w| !w.is_finished());
        if !state.workers.is_empty() {
            return;
        }
        state.accepting = true;
        state.cancel = CancellationToken::new();
        let concurrency = self.settings.download_concurrency;
        for worker_id in 0..concurrency {
            let scheduler = Arc::clone(self);
            let cancel = state.cancel.clone();
            state.workers.push(tokio::spawn(async move {
                scheduler.worker_loop(worker_id, cancel).await;
            }));
        }
        info!(concurrency, "Download worker pool started");
        self.logs.info(format!("Worker pool started (concurrency {concurrency})"));
    }

    /// Drain queued jobs as `skipped` and stop accepting work. In-flight jobs
    /// finish their current extractor step and report failed with a
    /// cancellation cause.
    pub async fn stop_all(&self) -> Result<usize> {
        let drained: Vec<i64> = {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            state.accepting = false;
            state.cancel.cancel();
            state.queue.drain(..).collect()
        };

        let mut skipped = 0;
        for id in drained {
            if db::downloads::mark_skipped(&self.db, id).await? {
                skipped += 1;
            }
        }
        // Wake parked workers so they observe the cancellation
        self.notify.notify_waiters();
        self.logs.warn(format!("Stop-all: {skipped} queued job(s) skipped"));
        Ok(skipped)
    }

    /// Bring a fresh worker pool up after a stop
    pub async fn restart(self: &Arc<Self>) -> Result<()> {
        let workers = {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            state.cancel.cancel();
            std::mem::take(&mut state.workers)
        };
        self.notify.notify_waiters();
        for worker in workers {
            let _ = worker.await;
        }
        self.start();
        self.logs.info("Worker pool restarted");
        Ok(())
    }

    /// Stop workers without draining the queue (shutdown path)
    pub async fn shutdown(&self) {
        let workers = {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            state.accepting = false;
            state.cancel.cancel();
            std::mem::take(&mut state.workers)
        };
        self.notify.notify_waiters();
        for worker in workers {
            let _ = worker.await;
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().expect("scheduler state poisoned");
        SchedulerStatus {
            worker_running: state.workers.iter().any(|w| !w.is_finished()),
            queue_size: state.queue.len(),
            active_tasks: self.active.load(Ordering::Relaxed),
            concurrency: self.settings.download_concurrency,
        }
    }

    /// Enqueue a download for a track.
    ///
    /// Without `force`, duplicate prevention short-circuits: an existing
    /// library file or an in-flight job for the track records an `already`
    /// row without queueing. With `force`, the library check is bypassed but
    /// a concurrent non-terminal job is refused outright.
    pub async fn enqueue(
        &self,
        track_id: i64,
        candidate_id: Option<i64>,
        force: bool,
    ) -> Result<Download> {
        // Validate references before touching the queue
        db::tracks::get_track(&self.db, track_id).await?;
        if let Some(candidate_id) = candidate_id {
            let candidate = db::candidates::get_candidate(&self.db, candidate_id).await?;
            if candidate.track_id != track_id {
                return Err(Error::InvalidInput(format!(
                    "Candidate {candidate_id} does not belong to track {track_id}"
                )));
            }
        }

        let in_flight = db::downloads::non_terminal_for_track(&self.db, track_id).await?;
        if force {
            if in_flight.is_some() {
                return Err(Error::Conflict(format!(
                    "Track {track_id} already has a download in progress"
                )));
            }
        } else {
            let has_file = db::library::exists_for_track(&self.db, track_id).await?;
            if has_file || in_flight.is_some() {
                let row = db::downloads::create_download(
                    &self.db,
                    track_id,
                    candidate_id,
                    DownloadStatus::Already,
                )
                .await?;
                self.logs.info(format!(
                    "Track {track_id}: duplicate prevention recorded 'already' (download {})",
                    row.id
                ));
                return Ok(row);
            }
        }

        // Resolve the candidate up front so a track without one fails fast
        if candidate_id.is_none()
            && db::candidates::chosen_for_track(&self.db, track_id).await?.is_none()
            && db::candidates::best_for_track(&self.db, track_id).await?.is_none()
        {
            return Err(Error::InvalidInput(format!(
                "NO_CANDIDATE: track {track_id} has no search candidate to download"
            )));
        }

        {
            let state = self.state.lock().expect("scheduler state poisoned");
            if !state.accepting {
                return Err(Error::Conflict(
                    "Worker pool is stopped; restart it before enqueueing".into(),
                ));
            }
        }

        let row =
            db::downloads::create_download(&self.db, track_id, candidate_id, DownloadStatus::Queued)
                .await?;

        {
            let mut state = self.state.lock().expect("scheduler state poisoned");
            state.queue.push_back(row.id);
        }
        self.notify.notify_one();
        self.logs.info(format!("Track {track_id}: download {} queued", row.id));
        Ok(row)
    }

    /// Cancel a queued job. Running jobs are refused with a conflict;
    /// cancelling an already-terminal job is a no-op.
    pub async fn cancel(&self, download_id: i64) -> Result<CancelOutcome> {
        let download = db::downloads::get_download(&self.db, download_id).await?;
        match download.status {
            DownloadStatus::Queued => {
                if db::downloads::mark_skipped(&self.db, download_id).await? {
                    let mut state = self.state.lock().expect("scheduler state poisoned");
                    state.queue.retain(|id| *id != download_id);
                    self.logs.info(format!("Download {download_id} cancelled while queued"));
                    Ok(CancelOutcome::Skipped)
                } else {
                    // Raced with a worker pop; by now it is running
                    Err(Error::Conflict(format!(
                        "Download {download_id} is running and cannot be cancelled"
                    )))
                }
            }
            DownloadStatus::Running => Err(Error::Conflict(format!(
                "Download {download_id} is running and cannot be cancelled"
            ))),
            _ => Ok(CancelOutcome::NoOp),
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, cancel: CancellationToken) {
        loop {
            let next = {
                let mut state = self.state.lock().expect("scheduler state poisoned");
                state.queue.pop_front()
            };

            let Some(download_id) = next else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.notify.notified() => continue,
                }
            };

            if cancel.is_cancelled() {
                // Drained by stop_all between pop and here
                if let Err(e) = db::downloads::mark_skipped(&self.db, download_id).await {
                    warn!(download_id, "Failed to skip drained job: {e}");
                }
                break;
            }

            self.active.fetch_add(1, Ordering::Relaxed);
            let context = job::JobContext {
                db: self.db.clone(),
                settings: Arc::clone(&self.settings),
                extractor: Arc::clone(&self.extractor),
                tagger: Arc::clone(&self.tagger),
                logs: Arc::clone(&self.logs),
                cancel: cancel.clone(),
            };
            if let Err(e) = job::run_job(&context, download_id).await {
                // Workers never crash the pool; the row already carries the cause
                warn!(worker_id, download_id, "Job error: {e}");
            }
            self.active.fetch_sub(1, Ordering::Relaxed);

            // Opportunistic history sweep; terminal rows only
            match db::downloads::trim_history(&self.db, self.settings.download_history_keep as i64)
                .await
            {
                Ok(trimmed) if trimmed > 0 => {
                    self.logs.info(format!("Trimmed {trimmed} old download record(s)"));
                }
                Ok(_) => {}
                Err(e) => warn!("History trim failed: {e}"),
            }
        }
    }
}
