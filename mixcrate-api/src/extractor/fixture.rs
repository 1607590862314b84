//! Deterministic fixture extractor
//!
//! Returns canned search results and writes placeholder audio files so the
//! whole acquisition pipeline can run without network access or external
//! binaries.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use mixcrate_common::Result;

use crate::util::sha256_file;

use super::{DownloadOutcome, DownloadRequest, Extractor, RawResult};

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9 ]+").unwrap());

#[derive(Debug, Default)]
pub struct FixtureExtractor;

impl FixtureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// The canned result set every fixture search returns
    pub fn canned_results(query: &str) -> Vec<RawResult> {
        let base = NON_ALNUM_RE.replace_all(query, "").trim().to_string();
        vec![
            RawResult {
                external_id: "fake1".to_string(),
                title: format!("{base} (Official Video)"),
                url: "https://youtu.be/fake1".to_string(),
                channel: Some("Channel A".to_string()),
                duration_sec: Some(180),
            },
            RawResult {
                external_id: "fake2".to_string(),
                title: format!("{base} (Extended Mix)"),
                url: "https://youtu.be/fake2".to_string(),
                channel: Some("DJ Channel".to_string()),
                duration_sec: Some(200),
            },
            RawResult {
                external_id: "fake3".to_string(),
                title: format!("Random Other {base}"),
                url: "https://youtu.be/fake3".to_string(),
                channel: Some("Other".to_string()),
                duration_sec: Some(175),
            },
        ]
    }
}

#[async_trait]
impl Extractor for FixtureExtractor {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let mut results = Self::canned_results(query);
        results.truncate(limit);
        Ok(results)
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome> {
        let filepath = request.dest_base.with_extension("mp3");
        if let Some(parent) = filepath.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Minimal ID3 header plus a text payload; enough for tests that
        // check existence, size and checksum stability
        let mut data = Vec::new();
        data.extend_from_slice(b"ID3\x03\x00\x00\x00\x00\x00\x00");
        data.extend_from_slice(
            format!("Fake audio for {}\n", request.dest_base.display()).as_bytes(),
        );
        tokio::fs::write(&filepath, &data).await?;

        let checksum = sha256_file(&filepath)?;
        Ok(DownloadOutcome {
            bytes: data.len() as i64,
            container: "mp3".to_string(),
            checksum_sha256: checksum,
            filepath,
        })
    }

    fn available(&self) -> bool {
        true
    }
}
