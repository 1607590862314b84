//! mixcrate service binary
//!
//! Startup order: environment (.env) -> tracing -> settings -> extractor
//! presence check -> database + migrations -> scheduler -> HTTP server.
//! Exit code is non-zero when the extractor binary is missing and fake mode
//! is off.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixcrate_api::extractor::YtDlpExtractor;
use mixcrate_api::spotify::SpotifyClient;
use mixcrate_api::{build_router, AppState};
use mixcrate_common::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment variables win over .env entries
    dotenvy::dotenv().ok();

    let log_level = std::env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mixcrate_api={log_level},mixcrate_common={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    info!("{} v{} starting...", settings.app_name, settings.version);

    // A missing extractor binary is a startup failure unless fake mode is on
    if !settings.download_fake && !settings.search_fake {
        if !YtDlpExtractor::binary_resolves(&settings.yt_dlp_bin) {
            error!(
                "Extractor binary '{}' not found; set YT_DLP_BIN or enable DOWNLOAD_FAKE",
                settings.yt_dlp_bin
            );
            return Err(anyhow::anyhow!("Missing extractor binary"));
        }
    }

    info!("Initializing database...");
    let db = mixcrate_common::db::init_database(&settings.database_url).await?;

    std::fs::create_dir_all(&settings.library_dir)?;
    info!("Library directory: {}", settings.library_dir.display());

    let provider = Arc::new(SpotifyClient::new(
        settings.spotify_client_id.clone().unwrap_or_default(),
        settings.spotify_client_secret.clone().unwrap_or_default(),
        settings.spotify_redirect_uri.clone().unwrap_or_default(),
    ));

    let disable_worker = settings.disable_download_worker;
    let state = AppState::new(db, settings, provider);
    if disable_worker {
        info!("Download worker disabled by configuration");
    } else {
        state.scheduler.start();
    }
    let scheduler = Arc::clone(&state.scheduler);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let bind_addr = format!("{host}:{port}");

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received; stopping worker pool");
            scheduler.shutdown().await;
        })
        .await?;

    Ok(())
}
