//! Extractor client
//!
//! Capability interface over the external "search + download audio" tool.
//! Two implementations exist: the real yt-dlp subprocess client and a
//! deterministic fixture used whenever `YOUTUBE_SEARCH_FAKE` /
//! `DOWNLOAD_FAKE` are enabled. Every automated test relies on the fixture.

mod fixture;
mod ytdlp;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use mixcrate_common::config::Settings;
use mixcrate_common::Result;

pub use fixture::FixtureExtractor;
pub use ytdlp::YtDlpExtractor;

/// One raw search result, prior to ranking
#[derive(Debug, Clone)]
pub struct RawResult {
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
}

/// Parameters for one audio download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Target path without extension; the extractor appends the container
    /// extension it produced
    pub dest_base: PathBuf,
    pub preferred_format: String,
    /// Extra arguments forwarded verbatim to the external tool
    pub extractor_args: Option<String>,
    /// Netscape-format cookie jar for authenticated content
    pub cookies_file: Option<PathBuf>,
    pub embed_thumbnail: bool,
}

/// A finished extraction
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub filepath: PathBuf,
    pub container: String,
    pub bytes: i64,
    pub checksum_sha256: String,
}

/// Abstract search + download capability.
///
/// Searches may run in parallel; each download job issues at most one
/// download call at a time.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch up to `limit` results for a free-text query. Implementations
    /// honor a wall-clock budget and return an empty list on timeout.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>>;

    /// Produce an audio file for the given source
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome>;

    /// Whether the external tool is actually available (always true for the
    /// fixture)
    fn available(&self) -> bool;
}

/// Pick the implementation the settings ask for
pub fn from_settings(settings: &Settings) -> Arc<dyn Extractor> {
    if settings.search_fake || settings.download_fake {
        Arc::new(FixtureExtractor::new())
    } else {
        Arc::new(YtDlpExtractor::new(settings))
    }
}
