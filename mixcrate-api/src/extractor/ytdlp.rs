//! yt-dlp subprocess client
//!
//! Searches use `ytsearchN:` with `--dump-json` (one JSON object per stdout
//! line). Downloads extract best audio and convert to the preferred format
//! via ffmpeg, dropping all source metadata; tags are written afterwards by
//! the tagger. An mp3 conversion failure is retried once as m4a.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use mixcrate_common::config::Settings;
use mixcrate_common::{Error, Result};

use crate::util::{sha256_file, stderr_prefix};

use super::{DownloadOutcome, DownloadRequest, Extractor, RawResult};

/// Extensions probed when locating the produced file
const OUTPUT_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "webm"];

const STDERR_MAX_LINES: usize = 12;
const STDERR_MAX_BYTES: usize = 2048;

pub struct YtDlpExtractor {
    yt_dlp_bin: String,
    ffmpeg_bin: String,
    search_timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            yt_dlp_bin: settings.yt_dlp_bin.clone(),
            ffmpeg_bin: settings.ffmpeg_bin.clone(),
            search_timeout: Duration::from_secs(settings.search_timeout_secs),
        }
    }

    /// Whether the configured binary resolves on PATH or as a file
    pub fn binary_resolves(bin: &str) -> bool {
        let path = PathBuf::from(bin);
        if path.is_absolute() || bin.contains(std::path::MAIN_SEPARATOR) {
            return path.exists();
        }
        std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths).any(|dir| {
                    let candidate = dir.join(bin);
                    candidate.exists() || candidate.with_extension("exe").exists()
                })
            })
            .unwrap_or(false)
    }

    fn parse_search_line(line: &str) -> Option<RawResult> {
        let data: serde_json::Value = serde_json::from_str(line).ok()?;
        let external_id = data["id"]
            .as_str()
            .or_else(|| data["display_id"].as_str())?
            .to_string();
        if external_id.is_empty() {
            return None;
        }
        let url = data["webpage_url"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={external_id}"));
        Some(RawResult {
            title: data["title"].as_str().unwrap_or_default().to_string(),
            channel: data["channel"]
                .as_str()
                .or_else(|| data["uploader"].as_str())
                .map(str::to_string),
            duration_sec: data["duration"].as_f64().map(|d| d as i64),
            external_id,
            url,
        })
    }

    fn download_command(&self, request: &DownloadRequest, audio_format: &str) -> Command {
        let mut cmd = Command::new(&self.yt_dlp_bin);
        cmd.arg("-x")
            .arg("--audio-format")
            .arg(audio_format)
            .arg("--ffmpeg-location")
            .arg(&self.ffmpeg_bin)
            .arg("--no-warnings");

        if request.embed_thumbnail {
            cmd.arg("--embed-thumbnail");
        }
        if let Some(cookies) = &request.cookies_file {
            cmd.arg("--cookies").arg(cookies);
        }
        if let Some(extra) = &request.extractor_args {
            for arg in extra.split_whitespace() {
                cmd.arg(arg);
            }
        }

        // Drop every source-derived tag during the remux; canonical tags are
        // written by the tagger afterwards
        let mut ff_args = vec!["-map_metadata", "-1"];
        if audio_format.eq_ignore_ascii_case("mp3") {
            ff_args.extend(["-id3v2_version", "3", "-write_id3v1", "1"]);
        }
        cmd.arg("--ppa").arg(format!("ffmpeg:{}", ff_args.join(" ")));

        cmd.arg("-o")
            .arg(format!("{}.%(ext)s", request.dest_base.display()))
            .arg(&request.url);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    async fn run_download(&self, request: &DownloadRequest, audio_format: &str) -> Result<()> {
        let mut cmd = self.download_command(request, audio_format);
        debug!(url = %request.url, format = audio_format, "Spawning extractor download");
        let output = cmd.output().await.map_err(|e| {
            Error::Extractor(format!(
                "Failed to start {}: {e}. Check YT_DLP_BIN/PATH.",
                self.yt_dlp_bin
            ))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extractor(stderr_prefix(
                &stderr,
                STDERR_MAX_LINES,
                STDERR_MAX_BYTES,
            )));
        }
        Ok(())
    }

    fn find_produced(&self, request: &DownloadRequest) -> Option<PathBuf> {
        OUTPUT_EXTENSIONS
            .iter()
            .map(|ext| request.dest_base.with_extension(ext))
            .find(|p| p.exists())
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawResult>> {
        let mut cmd = Command::new(&self.yt_dlp_bin);
        cmd.arg(format!("ytsearch{limit}:{query}"))
            .arg("--skip-download")
            .arg("--dump-json")
            .arg("--no-warnings")
            .arg("--default-search")
            .arg("ytsearch")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match tokio::time::timeout(self.search_timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                Error::Extractor(format!("Failed to start {}: {e}", self.yt_dlp_bin))
            })?,
            Err(_) => {
                // Wall-clock budget exhausted: empty list, caller decides
                warn!(query, timeout_s = self.search_timeout.as_secs(), "Search timed out");
                return Ok(Vec::new());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(query, "Search subprocess failed: {}", stderr_prefix(&stderr, 3, 500));
            return Ok(Vec::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(Self::parse_search_line).collect())
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome> {
        if let Some(parent) = request.dest_base.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let preferred = request.preferred_format.to_lowercase();
        match self.run_download(request, &preferred).await {
            Ok(()) => {}
            Err(first_err) if preferred == "mp3" => {
                // Minimal ffmpeg builds sometimes lack the mp3 encoder
                info!("mp3 conversion failed; retrying as m4a");
                self.run_download(request, "m4a").await.map_err(|_| first_err)?;
            }
            Err(e) => return Err(e),
        }

        let filepath = self
            .find_produced(request)
            .ok_or_else(|| Error::Extractor("Extractor did not produce an output file".into()))?;

        let bytes = std::fs::metadata(&filepath)?.len() as i64;
        let checksum = sha256_file(&filepath)?;
        let container = filepath
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_string();
        Ok(DownloadOutcome {
            filepath,
            container,
            bytes,
            checksum_sha256: checksum,
        })
    }

    fn available(&self) -> bool {
        Self::binary_resolves(&self.yt_dlp_bin)
    }
}
