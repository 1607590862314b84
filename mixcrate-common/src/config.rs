//! Configuration loading
//!
//! All runtime configuration comes from environment variables (optionally
//! seeded from a `.env` file by the binary before `Settings::from_env` runs).
//! Values are read once at startup and passed around as an owned struct.

use std::path::PathBuf;

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => !matches!(v.trim(), "" | "0" | "false" | "False" | "FALSE"),
        Err(_) => default,
    }
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Application settings resolved from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub version: String,

    /// SQLite connection string, e.g. `sqlite://./mixcrate.db`
    pub database_url: String,
    /// Process key used to encrypt refresh tokens at rest; empty disables
    /// encryption (tokens stored with a `plain:` prefix)
    pub secret_key: String,

    /// Directory that receives downloaded audio files
    pub library_dir: PathBuf,
    /// Optional Netscape-format cookie jar handed to the extractor
    pub cookies_file: Option<PathBuf>,

    // Extractor binaries
    pub yt_dlp_bin: String,
    pub ffmpeg_bin: String,
    pub preferred_audio_format: String,
    pub extractor_args: Option<String>,
    pub embed_thumbnail: bool,

    // Fixture toggles used by the whole test suite
    pub download_fake: bool,
    pub search_fake: bool,
    pub search_fallback_fake: bool,

    // Search paging and budget
    pub search_limit: usize,
    pub search_timeout_secs: u64,
    pub search_max_pages: usize,
    pub search_page_size: usize,
    pub search_page_stop_threshold: f64,

    // Scheduler
    /// Artificial extra seconds per job; tests use it to observe `running`
    pub download_simulate_seconds: f64,
    pub download_concurrency: usize,
    pub download_history_keep: usize,
    pub search_concurrency: usize,
    pub min_autochoose_score: f64,
    pub disable_download_worker: bool,

    pub log_buffer_max_lines: usize,

    // Spotify OAuth
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_redirect_uri: Option<String>,

    pub cors_origins: Vec<String>,
}

impl Settings {
    /// Read all recognized environment variables, applying defaults
    pub fn from_env() -> Self {
        Self {
            app_name: env_str("APP_NAME", "mixcrate"),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database_url: env_str("DATABASE_URL", "sqlite://./mixcrate.db?mode=rwc"),
            secret_key: env_str("SECRET_KEY", ""),
            library_dir: PathBuf::from(env_str("LIBRARY_DIR", "./library")),
            cookies_file: env_opt("YT_DLP_COOKIES_FILE").map(PathBuf::from),
            yt_dlp_bin: env_str("YT_DLP_BIN", "yt-dlp"),
            ffmpeg_bin: env_str("FFMPEG_BIN", "ffmpeg"),
            preferred_audio_format: env_str("PREFERRED_AUDIO_FORMAT", "mp3"),
            extractor_args: env_opt("DOWNLOAD_YTDLP_EXTRACTOR_ARGS"),
            embed_thumbnail: env_flag("DOWNLOAD_EMBED_THUMBNAIL", true),
            download_fake: env_flag("DOWNLOAD_FAKE", false),
            search_fake: env_flag("YOUTUBE_SEARCH_FAKE", false),
            search_fallback_fake: env_flag("YOUTUBE_SEARCH_FALLBACK_FAKE", false),
            search_limit: env_parse("YOUTUBE_SEARCH_LIMIT", 10),
            search_timeout_secs: env_parse("YOUTUBE_SEARCH_TIMEOUT", 8),
            search_max_pages: env_parse("YOUTUBE_SEARCH_MAX_PAGES", 3),
            search_page_size: env_parse("YOUTUBE_SEARCH_PAGE_SIZE", 10),
            search_page_stop_threshold: env_parse("YOUTUBE_SEARCH_PAGE_STOP_THRESHOLD", 150.0),
            download_simulate_seconds: env_parse("DOWNLOAD_SIMULATE_SECONDS", 0.0),
            download_concurrency: env_parse("DOWNLOAD_CONCURRENCY", 2).max(1),
            download_history_keep: env_parse("DOWNLOAD_HISTORY_KEEP", 30),
            search_concurrency: env_parse("SEARCH_CONCURRENCY", 3).max(1),
            min_autochoose_score: env_parse("MIN_AUTOCHOOSE_SCORE", 60.0),
            disable_download_worker: env_flag("DISABLE_DOWNLOAD_WORKER", false),
            log_buffer_max_lines: env_parse("LOG_BUFFER_MAX_LINES", 200),
            spotify_client_id: env_opt("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: env_opt("SPOTIFY_CLIENT_SECRET"),
            spotify_redirect_uri: env_opt("SPOTIFY_REDIRECT_URI"),
            cors_origins: split_csv(env_opt("CORS_ORIGINS")),
        }
    }
}
