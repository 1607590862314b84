//! mixcrate service library
//!
//! Everything the binary wires together: candidate ranking, the extractor
//! client, the download scheduler and acquisition pipeline, the Spotify sync
//! ingestor, and the HTTP API. `build_router` is exported so integration
//! tests can drive the API in-process.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use mixcrate_common::config::Settings;

pub mod api;
pub mod error;
pub mod extractor;
pub mod fs_times;
pub mod logbuf;
pub mod ranking;
pub mod scheduler;
pub mod search;
pub mod spotify;
pub mod tagger;
pub mod util;

use logbuf::LogBuffer;
use ranking::{RankingConfig, RankingService};
use scheduler::DownloadScheduler;
use spotify::CatalogProvider;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub scheduler: Arc<DownloadScheduler>,
    pub provider: Arc<dyn CatalogProvider>,
}

impl AppState {
    /// Assemble the full state graph from a database pool and settings.
    /// The scheduler is created but not started; callers decide.
    pub fn new(
        db: SqlitePool,
        settings: Settings,
        provider: Arc<dyn CatalogProvider>,
    ) -> Self {
        let settings = Arc::new(settings);
        let logs = Arc::new(LogBuffer::new(settings.log_buffer_max_lines));
        let extractor = extractor::from_settings(&settings);
        let ranking = Arc::new(RankingService::new(RankingConfig::default()));
        let scheduler = DownloadScheduler::new(
            db.clone(),
            Arc::clone(&settings),
            extractor,
            ranking,
            logs,
        );
        Self { db, settings, scheduler, provider }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = if state.settings.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .settings
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/", axum::routing::get(api::health::info))
        .route("/health", axum::routing::get(api::health::health))
        .route("/info", axum::routing::get(api::health::info))
        .nest("/api/v1", api::routes())
        .with_state(state)
        .layer(cors)
}
