//! Catalog entity types
//!
//! Row structs map 1:1 onto tables; enums are stored as lowercase TEXT.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// External catalog a track or playlist originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SourceProvider {
    Manual,
    Spotify,
    Youtube,
}

impl SourceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceProvider::Manual => "manual",
            SourceProvider::Spotify => "spotify",
            SourceProvider::Youtube => "youtube",
        }
    }
}

/// Video platform a search candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SearchProvider {
    Youtube,
    Ytmusic,
    Other,
}

/// Download job lifecycle; transitions form a DAG:
/// `queued -> running -> {done, failed}`, `queued -> skipped`,
/// and `already` recorded at enqueue time by duplicate prevention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Running,
    Done,
    Failed,
    Skipped,
    Already,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Done
                | DownloadStatus::Failed
                | DownloadStatus::Skipped
                | DownloadStatus::Already
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Running => "running",
            DownloadStatus::Done => "done",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Skipped => "skipped",
            DownloadStatus::Already => "already",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Track {
    pub id: i64,
    pub title: String,
    pub artists: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<i64>,
    pub duration_ms: Option<i64>,
    pub isrc: Option<String>,
    pub year: Option<i64>,
    pub release_date: Option<NaiveDate>,
    pub spotify_added_at: Option<DateTime<Utc>>,
    pub explicit: bool,
    pub cover_url: Option<String>,
    pub normalized_title: String,
    pub normalized_artists: String,
    /// Set by the bulk auto-download path when a search produced no candidate
    /// above the auto-choose threshold
    pub searched_not_found: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating or updating a track; normalized columns are
/// derived server-side
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTrack {
    pub title: String,
    pub artists: String,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<i64>,
    pub duration_ms: Option<i64>,
    pub isrc: Option<String>,
    pub year: Option<i64>,
    pub release_date: Option<NaiveDate>,
    pub spotify_added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub explicit: bool,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackIdentity {
    pub id: i64,
    pub track_id: i64,
    pub provider: SourceProvider,
    pub provider_track_id: String,
    pub provider_url: Option<String>,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Playlist {
    pub id: i64,
    pub source_account_id: Option<i64>,
    pub provider: SourceProvider,
    pub provider_playlist_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    /// Opaque change token from the provider; unchanged snapshot means
    /// unchanged content
    pub snapshot: Option<String>,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistTrack {
    pub id: i64,
    pub playlist_id: i64,
    pub track_id: i64,
    pub position: Option<i64>,
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchCandidate {
    pub id: i64,
    pub track_id: i64,
    pub provider: SearchProvider,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
    pub score: f64,
    pub chosen: bool,
    /// JSON-serialized per-rule score breakdown, kept for UI transparency
    pub score_breakdown: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
    pub track_id: i64,
    pub provider: SearchProvider,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
    pub score: f64,
    pub score_breakdown: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Download {
    pub id: i64,
    pub track_id: i64,
    pub candidate_id: Option<i64>,
    pub provider: String,
    pub status: DownloadStatus,
    pub filepath: Option<String>,
    pub format: Option<String>,
    pub filesize_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LibraryFile {
    pub id: i64,
    pub track_id: i64,
    pub filepath: String,
    pub file_size: Option<i64>,
    pub file_mtime: Option<DateTime<Utc>>,
    pub checksum_sha256: Option<String>,
    pub container: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceAccount {
    pub id: i64,
    pub provider: SourceProvider,
    pub name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OAuthToken {
    pub id: i64,
    pub source_account_id: i64,
    pub provider: SourceProvider,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token_encrypted: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OAuthState {
    pub id: i64,
    pub provider: SourceProvider,
    pub source_account_id: i64,
    pub state: String,
    #[serde(skip_serializing)]
    pub code_verifier: String,
    pub redirect_to: Option<String>,
    pub consumed: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
