//! HTTP API
//!
//! Thin request handlers over the catalog and scheduler. One module per
//! resource; request/response structs live next to their handlers.

pub mod candidates;
pub mod downloads;
pub mod health;
pub mod identities;
pub mod library;
pub mod oauth;
pub mod playlists;
pub mod range;
pub mod settings;
pub mod tracks;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Everything under `/api/v1`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/info", get(health::info))
        // Tracks
        .route("/tracks", get(tracks::list).post(tracks::create))
        .route("/tracks/normalize/preview", get(tracks::normalize_preview))
        .route("/tracks/with_playlist_info", get(tracks::with_playlist_info))
        .route("/tracks/ready_for_download", get(tracks::ready_for_download))
        .route("/tracks/import/json", post(tracks::import_json))
        .route("/tracks/export", get(tracks::export))
        .route(
            "/tracks/:track_id",
            get(tracks::get).put(tracks::update).delete(tracks::delete),
        )
        .route("/tracks/:track_id/youtube/search", get(tracks::youtube_search))
        .route("/tracks/:track_id/cover/refresh", post(tracks::cover_refresh))
        .route("/tracks/:track_id/identities", get(tracks::track_identities))
        // Identities
        .route("/identities", get(identities::list).post(identities::create))
        .route(
            "/identities/:identity_id",
            get(identities::get).put(identities::update).delete(identities::delete),
        )
        // Candidates
        .route("/candidates", get(candidates::list).post(candidates::create))
        .route("/candidates/enriched", get(candidates::enriched))
        .route(
            "/candidates/:candidate_id",
            get(candidates::get).delete(candidates::delete),
        )
        .route("/candidates/:candidate_id/choose", post(candidates::choose))
        // Downloads
        .route("/downloads", get(downloads::list))
        .route("/downloads/with_tracks", get(downloads::list_with_tracks))
        .route("/downloads/enqueue", post(downloads::enqueue))
        .route("/downloads/cancel/:download_id", post(downloads::cancel))
        .route("/downloads/stop_all", post(downloads::stop_all))
        .route("/downloads/restart_worker", post(downloads::restart_worker))
        .route("/downloads/status", get(downloads::status))
        .route("/downloads/logs", get(downloads::logs))
        .route("/downloads/:download_id", get(downloads::get))
        // Library
        .route("/library/files", get(library::list))
        .route("/library/files/scan", post(library::scan))
        .route(
            "/library/files/reindex_from_tracks",
            post(library::reindex_from_tracks),
        )
        .route("/library/files/resync", post(library::resync))
        .route(
            "/library/files/:file_id",
            get(library::get).delete(library::delete),
        )
        .route("/library/files/:file_id/download", get(library::download))
        .route("/library/files/:file_id/stream", get(library::stream))
        .route("/library/files/:file_id/reveal", post(library::reveal))
        // Playlists
        .route("/playlists", get(playlists::list).post(playlists::create))
        .route("/playlists/stats", get(playlists::stats))
        .route("/playlists/memberships", post(playlists::memberships))
        .route("/playlists/spotify/discover", get(playlists::spotify_discover))
        .route("/playlists/spotify/select", post(playlists::spotify_select))
        .route("/playlists/spotify/sync", post(playlists::spotify_sync))
        .route("/playlists/:playlist_id", get(playlists::get))
        .route("/playlists/:playlist_id/entries", get(playlists::entries))
        .route(
            "/playlists/:playlist_id/auto_download",
            post(playlists::auto_download),
        )
        .route(
            "/playlists/:playlist_id/retry_not_found",
            post(playlists::retry_not_found),
        )
        // OAuth + accounts
        .route("/sources/accounts", get(oauth::list_accounts).post(oauth::create_account))
        .route("/oauth/tokens", get(oauth::list_tokens).post(oauth::store_token))
        .route("/oauth/spotify/authorize", get(oauth::spotify_authorize))
        .route("/oauth/spotify/callback", get(oauth::spotify_callback))
        .route("/oauth/spotify/refresh", post(oauth::spotify_refresh))
        .route(
            "/oauth/spotify/ensure_account",
            post(oauth::spotify_ensure_account),
        )
        // Settings (cookie jar management)
        .route(
            "/settings/cookies",
            get(settings::cookies_status)
                .post(settings::cookies_upload)
                .delete(settings::cookies_delete),
        )
        .route("/settings/cookies/check", get(settings::cookies_check))
}
