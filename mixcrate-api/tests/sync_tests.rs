//! Sync ingestor tests against the fixture catalog provider:
//! discovery, selection, snapshot-keyed idempotence, membership reconciliation

mod helpers;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use serde_json::json;

use mixcrate_api::spotify::{RemotePlaylist, RemoteTrackItem};

use helpers::{request, spawn_app, TestApp};

fn remote_playlist(snapshot: &str) -> RemotePlaylist {
    RemotePlaylist {
        provider_playlist_id: "pl_1".to_string(),
        name: "Weekly Digs".to_string(),
        owner: Some("digger".to_string()),
        snapshot: snapshot.to_string(),
    }
}

fn remote_item(n: usize) -> RemoteTrackItem {
    RemoteTrackItem {
        provider_track_id: format!("sp_track_{n}"),
        title: format!("Song {n}"),
        artists: format!("Artist {n}"),
        album: Some("Album".to_string()),
        cover_url: Some(format!("https://i.scdn.co/image/cover{n}")),
        duration_ms: Some(180_000 + n as i64 * 1000),
        isrc: Some(format!("ISRC{n:08}")),
        explicit: false,
        release_date: chrono::NaiveDate::from_ymd_opt(2023, 3, 20),
        added_at: Some(Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, n as u32).unwrap()),
    }
}

/// Account + stored token + discovered/selected playlist
async fn connected_account(app: &TestApp) -> (i64, i64) {
    let (status, account) = request(
        &app.router,
        "POST",
        "/api/v1/sources/accounts",
        Some(json!({"provider": "spotify", "name": "Main"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let account_id = account["id"].as_i64().unwrap();

    let (status, _) = request(
        &app.router,
        "POST",
        "/api/v1/oauth/tokens",
        Some(json!({
            "source_account_id": account_id,
            "provider": "spotify",
            "access_token": "token",
            "refresh_token": "refresh",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, discovered) = request(
        &app.router,
        "GET",
        &format!("/api/v1/playlists/spotify/discover?account_id={account_id}&persist=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(discovered.as_array().unwrap().len(), 1);

    let (_, playlists) = request(&app.router, "GET", "/api/v1/playlists", None).await;
    let playlist_id = playlists.as_array().unwrap()[0]["id"].as_i64().unwrap();

    let (status, body) = request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/select",
        Some(json!({"account_id": account_id, "playlist_ids": [playlist_id]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["selected"], 1);

    (account_id, playlist_id)
}

#[tokio::test]
async fn sync_is_incremental_and_idempotent() {
    let app = spawn_app().await;
    app.provider.set_playlists(vec![remote_playlist("S1")]);
    app.provider
        .set_tracks("pl_1", (1..=5).map(remote_item).collect());

    let (account_id, playlist_id) = connected_account(&app).await;

    // First sync creates 5 tracks, 5 identities, 5 links
    let (status, body) = request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["tracks_created"], 5);
    assert_eq!(body["links_created"], 5);
    assert_eq!(body["skipped"], 0);

    let (_, entries) = request(
        &app.router,
        "GET",
        &format!("/api/v1/playlists/{playlist_id}/entries"),
        None,
    )
    .await;
    assert_eq!(entries.as_array().unwrap().len(), 5);

    // Every synced track carries a spotify identity
    let first_track_id = entries.as_array().unwrap()[0]["id"].as_i64().unwrap();
    let (_, identities) = request(
        &app.router,
        "GET",
        &format!("/api/v1/tracks/{first_track_id}/identities"),
        None,
    )
    .await;
    assert!(identities
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["provider"] == "spotify"));

    // Second sync with the same snapshot mutates nothing
    let (_, body) = request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id})),
    )
    .await;
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["tracks_created"], 0);
    assert_eq!(body["links_created"], 0);
    assert_eq!(body["links_removed"], 0);
    assert_eq!(body["playlists"][0]["skipped"], true);

    // Third sync with a new snapshot: one track added, one removed
    let mut items: Vec<RemoteTrackItem> = (2..=5).map(remote_item).collect();
    items.push(remote_item(6));
    app.provider.set_playlists(vec![remote_playlist("S2")]);
    app.provider.set_tracks("pl_1", items);

    let (_, body) = request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id})),
    )
    .await;
    assert_eq!(body["tracks_created"], 1);
    assert_eq!(body["links_created"], 1);
    assert_eq!(body["links_removed"], 1);

    let (_, entries) = request(
        &app.router,
        "GET",
        &format!("/api/v1/playlists/{playlist_id}/entries"),
        None,
    )
    .await;
    assert_eq!(entries.as_array().unwrap().len(), 5);

    // The removed track still exists in the catalog (links never cascade)
    let (_, tracks) = request(&app.router, "GET", "/api/v1/tracks", None).await;
    assert_eq!(tracks.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn force_resyncs_an_unchanged_snapshot() {
    let app = spawn_app().await;
    app.provider.set_playlists(vec![remote_playlist("S1")]);
    app.provider
        .set_tracks("pl_1", (1..=2).map(remote_item).collect());

    let (account_id, _) = connected_account(&app).await;

    request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id})),
    )
    .await;

    let (_, body) = request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id, "force": true})),
    )
    .await;
    // Forced: reconciled rather than skipped, and still no mutations
    assert_eq!(body["skipped"], 0);
    assert_eq!(body["playlists"][0]["skipped"], false);
    assert_eq!(body["tracks_created"], 0);
    assert_eq!(body["links_created"], 0);
    assert_eq!(body["links_removed"], 0);
}

#[tokio::test]
async fn sync_dedups_by_isrc_before_creating_tracks() {
    let app = spawn_app().await;

    // Pre-existing manual track sharing the ISRC with the remote item
    let (_, existing) = request(
        &app.router,
        "POST",
        "/api/v1/tracks",
        Some(json!({"artists": "Artist 1", "title": "Completely Different Name", "isrc": "ISRC00000001"})),
    )
    .await;
    let existing_id = existing["id"].as_i64().unwrap();

    app.provider.set_playlists(vec![remote_playlist("S1")]);
    app.provider.set_tracks("pl_1", vec![remote_item(1)]);
    let (account_id, playlist_id) = connected_account(&app).await;

    let (_, body) = request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id})),
    )
    .await;
    assert_eq!(body["tracks_created"], 0, "ISRC match reuses the track: {body}");
    assert_eq!(body["links_created"], 1);

    let (_, entries) = request(
        &app.router,
        "GET",
        &format!("/api/v1/playlists/{playlist_id}/entries"),
        None,
    )
    .await;
    assert_eq!(entries.as_array().unwrap()[0]["id"].as_i64(), Some(existing_id));
}

#[tokio::test]
async fn selection_is_a_set_operation() {
    let app = spawn_app().await;
    app.provider.set_playlists(vec![
        RemotePlaylist {
            provider_playlist_id: "pl_1".into(),
            name: "One".into(),
            owner: None,
            snapshot: "S1".into(),
        },
        RemotePlaylist {
            provider_playlist_id: "pl_2".into(),
            name: "Two".into(),
            owner: None,
            snapshot: "S1".into(),
        },
    ]);

    let (_, account) = request(
        &app.router,
        "POST",
        "/api/v1/sources/accounts",
        Some(json!({"provider": "spotify", "name": "Main"})),
    )
    .await;
    let account_id = account["id"].as_i64().unwrap();
    request(
        &app.router,
        "POST",
        "/api/v1/oauth/tokens",
        Some(json!({"source_account_id": account_id, "provider": "spotify", "access_token": "t"})),
    )
    .await;
    request(
        &app.router,
        "GET",
        &format!("/api/v1/playlists/spotify/discover?account_id={account_id}&persist=true"),
        None,
    )
    .await;

    let (_, playlists) = request(&app.router, "GET", "/api/v1/playlists", None).await;
    let ids: Vec<i64> = playlists
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);

    // Select the first, then switch to the second; exactly one stays selected
    request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/select",
        Some(json!({"account_id": account_id, "playlist_ids": [ids[0]]})),
    )
    .await;
    request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/select",
        Some(json!({"account_id": account_id, "playlist_ids": [ids[1]]})),
    )
    .await;

    let (_, selected) =
        request(&app.router, "GET", "/api/v1/playlists?selected_only=true", None).await;
    let selected = selected.as_array().unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0]["id"].as_i64(), Some(ids[1]));
}

#[tokio::test]
async fn playlist_stats_report_progress() {
    let app = spawn_app().await;
    app.provider.set_playlists(vec![remote_playlist("S1")]);
    app.provider
        .set_tracks("pl_1", (1..=3).map(remote_item).collect());
    let (account_id, playlist_id) = connected_account(&app).await;
    request(
        &app.router,
        "POST",
        "/api/v1/playlists/spotify/sync",
        Some(json!({"account_id": account_id})),
    )
    .await;

    let (status, body) = request(&app.router, "GET", "/api/v1/playlists/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = body.as_array().unwrap();
    let row = stats
        .iter()
        .find(|s| s["playlist_id"].as_i64() == Some(playlist_id))
        .unwrap();
    assert_eq!(row["total_tracks"], 3);
    assert_eq!(row["downloaded"], 0);
}
