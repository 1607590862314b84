//! Shared test harness
//!
//! In-memory SQLite, fixture extractor/provider toggles, and a oneshot
//! driver over the real router.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use mixcrate_api::spotify::{CatalogProvider, RemotePlaylist, RemoteTrackItem, TokenResponse};
use mixcrate_api::{build_router, AppState};
use mixcrate_common::config::Settings;
use mixcrate_common::{Error, Result};

/// Programmable stand-in for the streaming catalog
#[derive(Default)]
pub struct FixtureProvider {
    pub playlists: Mutex<Vec<RemotePlaylist>>,
    pub tracks: Mutex<Vec<(String, Vec<RemoteTrackItem>)>>,
}

impl FixtureProvider {
    pub fn set_playlists(&self, playlists: Vec<RemotePlaylist>) {
        *self.playlists.lock().unwrap() = playlists;
    }

    pub fn set_tracks(&self, provider_playlist_id: &str, items: Vec<RemoteTrackItem>) {
        let mut tracks = self.tracks.lock().unwrap();
        tracks.retain(|(id, _)| id != provider_playlist_id);
        tracks.push((provider_playlist_id.to_string(), items));
    }
}

#[async_trait]
impl CatalogProvider for FixtureProvider {
    async fn current_user_playlists(&self, _access_token: &str) -> Result<Vec<RemotePlaylist>> {
        Ok(self.playlists.lock().unwrap().clone())
    }

    async fn playlist_tracks(
        &self,
        _access_token: &str,
        provider_playlist_id: &str,
    ) -> Result<Vec<RemoteTrackItem>> {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == provider_playlist_id)
            .map(|(_, items)| items.clone())
            .ok_or_else(|| Error::External(format!("Unknown playlist {provider_playlist_id}")))
    }

    async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenResponse> {
        Ok(TokenResponse {
            access_token: "fixture-access".to_string(),
            refresh_token: Some("fixture-refresh".to_string()),
            expires_in: 3600,
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse> {
        Ok(TokenResponse {
            access_token: "fixture-access-2".to_string(),
            refresh_token: None,
            expires_in: 3600,
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<FixtureProvider>,
    pub library_dir: tempfile::TempDir,
}

/// Settings wired for fixtures: fake search/download, temp library dir
pub fn fixture_settings(library_dir: &std::path::Path) -> Settings {
    let mut settings = Settings::from_env();
    settings.search_fake = true;
    settings.download_fake = true;
    settings.library_dir = PathBuf::from(library_dir);
    settings.download_concurrency = 2;
    settings.download_simulate_seconds = 0.0;
    settings.secret_key = "test-secret-key".to_string();
    settings.min_autochoose_score = 60.0;
    settings.cors_origins = Vec::new();
    settings
}

/// Full application over in-memory SQLite; the worker pool is started
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customize: impl FnOnce(&mut Settings)) -> TestApp {
    let library_dir = tempfile::tempdir().expect("temp library dir");
    let mut settings = fixture_settings(library_dir.path());
    customize(&mut settings);

    let db = mixcrate_common::db::init_database("sqlite::memory:")
        .await
        .expect("database init");

    let provider = Arc::new(FixtureProvider::default());
    let state = AppState::new(db, settings, provider.clone());
    state.scheduler.start();
    let router = build_router(state.clone());

    TestApp { router, state, provider, library_dir }
}

/// Drive one request through the router, returning status and parsed body
pub async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(value.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Raw variant for endpoints serving bytes (stream/download)
pub async fn request_raw(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .expect("request");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes.to_vec())
}

/// Create a track through the API and return its id
pub async fn create_track(router: &Router, artists: &str, title: &str, duration_ms: i64) -> i64 {
    let (status, body) = request(
        router,
        "POST",
        "/api/v1/tracks",
        Some(serde_json::json!({
            "artists": artists,
            "title": title,
            "duration_ms": duration_ms,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "track create failed: {body}");
    body["id"].as_i64().expect("track id")
}

/// Create a candidate through the API and return its id
pub async fn create_candidate(router: &Router, track_id: i64, external_id: &str) -> i64 {
    let (status, body) = request(
        router,
        "POST",
        "/api/v1/candidates",
        Some(serde_json::json!({
            "track_id": track_id,
            "provider": "youtube",
            "external_id": external_id,
            "url": format!("https://youtu.be/{external_id}"),
            "title": "Some upload",
            "channel": "Some channel",
            "duration_sec": 200,
            "score": 120.0,
            "score_breakdown": null,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "candidate create failed: {body}");
    body["id"].as_i64().expect("candidate id")
}

/// Poll the downloads list until every job for the track is terminal
pub async fn wait_for_terminal(router: &Router, track_id: i64, timeout_ms: u64) -> Vec<Value> {
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    loop {
        let (_, body) = request(
            router,
            "GET",
            &format!("/api/v1/downloads?track_id={track_id}"),
            None,
        )
        .await;
        let rows: Vec<Value> = body.as_array().cloned().unwrap_or_default();
        let all_terminal = !rows.is_empty()
            && rows.iter().all(|r| {
                matches!(
                    r["status"].as_str(),
                    Some("done") | Some("failed") | Some("skipped") | Some("already")
                )
            });
        if all_terminal {
            return rows;
        }
        if std::time::Instant::now() > deadline {
            return rows;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
