//! File timestamp capability
//!
//! Downloaded files get their modification time from catalog data so file
//! managers sort the library meaningfully: latest playlist `added_at`, then
//! `spotify_added_at`, then the release date, then now. Creation time wants
//! the release date but is OS-dependent; where the platform offers no API it
//! is logged and skipped. Nothing here ever fails a job.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use filetime::FileTime;
use tracing::{debug, warn};

use mixcrate_common::db::Track;
use mixcrate_common::Result;

/// Timestamp choices resolved from catalog data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimes {
    pub mtime: DateTime<Utc>,
    pub creation: DateTime<Utc>,
}

fn date_to_utc(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

/// Resolve the mtime/creation pair for a track.
///
/// `latest_added_at` is the newest `added_at` across the track's playlist
/// memberships, already fetched by the caller.
pub fn resolve_times(track: &Track, latest_added_at: Option<DateTime<Utc>>) -> ResolvedTimes {
    let mtime = latest_added_at
        .or(track.spotify_added_at)
        .or(track.release_date.map(date_to_utc))
        .unwrap_or_else(Utc::now);
    let creation = track.release_date.map(date_to_utc).unwrap_or(mtime);
    ResolvedTimes { mtime, creation }
}

/// Apply the resolved times to a file. Modification time always; creation
/// time best-effort.
pub fn apply_times(path: &Path, times: ResolvedTimes) -> Result<()> {
    let mtime = FileTime::from_unix_time(times.mtime.timestamp(), 0);
    filetime::set_file_mtime(path, mtime)?;

    if let Err(e) = set_creation_time(path, times.creation) {
        warn!(path = %path.display(), "Creation time not applied: {e}");
    }
    Ok(())
}

fn set_creation_time(path: &Path, _creation: DateTime<Utc>) -> std::io::Result<()> {
    // Birth time is immutable on Linux; other platforms need native calls
    // this build does not link
    debug!(path = %path.display(), "Platform does not expose a creation-time API");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn track_with(
        release_date: Option<NaiveDate>,
        spotify_added_at: Option<DateTime<Utc>>,
    ) -> Track {
        Track {
            id: 1,
            title: "T".to_string(),
            artists: "A".to_string(),
            album: None,
            genre: None,
            bpm: None,
            duration_ms: None,
            isrc: None,
            year: None,
            release_date,
            spotify_added_at,
            explicit: false,
            cover_url: None,
            normalized_title: "t".to_string(),
            normalized_artists: "a".to_string(),
            searched_not_found: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn mtime_prefers_playlist_added_at() {
        let added = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let spotify = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let release = NaiveDate::from_ymd_opt(2023, 3, 20);
        let track = track_with(release, Some(spotify));

        let times = resolve_times(&track, Some(added));
        assert_eq!(times.mtime, added);
        assert_eq!(times.creation, date_to_utc(release.unwrap()));
    }

    #[test]
    fn fallback_chain_reaches_release_date_then_now() {
        let release = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
        let track = track_with(Some(release), None);
        let times = resolve_times(&track, None);
        assert_eq!(times.mtime, date_to_utc(release));
        assert_eq!(times.creation, date_to_utc(release));

        let bare = track_with(None, None);
        let times = resolve_times(&bare, None);
        assert_eq!(times.creation, times.mtime);
        assert!(Utc::now().signed_duration_since(times.mtime).num_seconds() < 5);
    }

    #[test]
    fn mtime_is_applied_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"x").unwrap();

        let when = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        apply_times(&path, ResolvedTimes { mtime: when, creation: when }).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), when.timestamp());
    }
}
