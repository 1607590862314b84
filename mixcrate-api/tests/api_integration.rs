//! API integration tests: catalog CRUD, invariants, normalization preview,
//! search persistence, import/export round-trip

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use helpers::{create_candidate, create_track, request, spawn_app};

#[tokio::test]
async fn health_and_info_respond() {
    let app = spawn_app().await;

    let (status, body) = request(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(&app.router, "GET", "/api/v1/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["name"].is_string());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn track_creation_auto_creates_manual_identity() {
    let app = spawn_app().await;
    let track_id = create_track(&app.router, "Block & Crown", "Lonely Heart", 240_000).await;

    let (status, body) = request(
        &app.router,
        "GET",
        &format!("/api/v1/tracks/{track_id}/identities"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let identities = body.as_array().unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0]["provider"], "manual");
    assert_eq!(
        identities[0]["provider_track_id"],
        format!("manual:{track_id}")
    );
}

#[tokio::test]
async fn track_crud_round_trip() {
    let app = spawn_app().await;
    let track_id = create_track(&app.router, "Artist", "Song", 180_000).await;

    let (status, body) =
        request(&app.router, "GET", &format!("/api/v1/tracks/{track_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["normalized_artists"], "artist");
    assert_eq!(body["normalized_title"], "song");

    let (status, body) = request(
        &app.router,
        "PUT",
        &format!("/api/v1/tracks/{track_id}"),
        Some(json!({"artists": "Artist", "title": "Song (Remastered 2011)", "duration_ms": 180000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["normalized_title"], "song");

    let (status, _) = request(
        &app.router,
        "DELETE",
        &format!("/api/v1/tracks/{track_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        request(&app.router, "GET", &format!("/api/v1/tracks/{track_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_track_cascades_owned_rows() {
    let app = spawn_app().await;
    let track_id = create_track(&app.router, "Artist", "Song", 180_000).await;
    let candidate_id = create_candidate(&app.router, track_id, "vid1").await;

    let (status, _) = request(
        &app.router,
        "DELETE",
        &format!("/api/v1/tracks/{track_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(
        &app.router,
        "GET",
        &format!("/api/v1/candidates/{candidate_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn normalize_preview_is_pure() {
    let app = spawn_app().await;
    let (status, body) = request(
        &app.router,
        "GET",
        "/api/v1/tracks/normalize/preview?artists=Artist%20feat.%20Guest&title=Tune%20(Radio%20Edit)",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary_artist"], "Artist");
    assert_eq!(body["normalized_artists"], "artist & guest");
    assert_eq!(body["normalized_title"], "tune");
    assert_eq!(body["is_remix_or_edit"], true);
}

#[tokio::test]
async fn choose_candidate_is_exclusive_among_siblings() {
    let app = spawn_app().await;
    let track_id = create_track(&app.router, "Artist", "Song", 180_000).await;
    let first = create_candidate(&app.router, track_id, "vid1").await;
    let second = create_candidate(&app.router, track_id, "vid2").await;

    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/api/v1/candidates/{first}/choose"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chosen"], true);

    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/api/v1/candidates/{second}/choose"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = request(
        &app.router,
        "GET",
        &format!("/api/v1/candidates?track_id={track_id}"),
        None,
    )
    .await;
    let chosen: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["chosen"] == true)
        .collect();
    assert_eq!(chosen.len(), 1);
    assert_eq!(chosen[0]["id"].as_i64(), Some(second));
}

#[tokio::test]
async fn search_ranks_and_optionally_persists_candidates() {
    let app = spawn_app().await;
    let track_id = create_track(&app.router, "Artist", "Song", 180_000).await;

    // Without persist nothing is stored
    let (status, body) = request(
        &app.router,
        "GET",
        &format!("/api/v1/tracks/{track_id}/youtube/search"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 3);
    // descending scores
    let totals: Vec<f64> = candidates
        .iter()
        .map(|c| c["score"]["total"].as_f64().unwrap())
        .collect();
    assert!(totals.windows(2).all(|w| w[0] >= w[1]));

    let (_, body) = request(
        &app.router,
        "GET",
        &format!("/api/v1/candidates?track_id={track_id}"),
        None,
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 0);

    // With persist the top results become candidate rows with breakdowns
    let (status, _) = request(
        &app.router,
        "GET",
        &format!("/api/v1/tracks/{track_id}/youtube/search?persist=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = request(
        &app.router,
        "GET",
        &format!("/api/v1/candidates?track_id={track_id}"),
        None,
    )
    .await;
    let stored = body.as_array().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|c| c["score_breakdown"].is_string()));

    // Cover was backfilled from the best result's thumbnail
    let (_, body) =
        request(&app.router, "GET", &format!("/api/v1/tracks/{track_id}"), None).await;
    assert!(body["cover_url"]
        .as_str()
        .unwrap()
        .contains("img.youtube.com"));
}

#[tokio::test]
async fn import_export_round_trips_the_supported_subset() {
    let app = spawn_app().await;

    let payload = json!([
        {"artists": "A One", "title": "First", "genre": "House", "bpm": 124, "duration": "3:00"},
        {"artists": "B Two", "title": "Second", "genre": null, "bpm": null, "duration": "2:39"},
        {"artists": "", "title": "Broken"},
    ]);
    let (status, body) = request(&app.router, "POST", "/api/v1/tracks/import/json", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 3);
    assert_eq!(body["created"], 2);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);

    // Re-importing the same rows creates nothing
    let again = json!([
        {"artists": "A One", "title": "First", "genre": "House", "bpm": 124, "duration": "3:00"},
    ]);
    let (_, body) = request(&app.router, "POST", "/api/v1/tracks/import/json", Some(again)).await;
    assert_eq!(body["created"], 0);
    assert_eq!(body["to_create_non_duplicates"], 0);

    // Export matches what import accepted
    let (status, body) = request(&app.router, "GET", "/api/v1/tracks/export", None).await;
    assert_eq!(status, StatusCode::OK);
    let exported = body.as_array().unwrap();
    assert_eq!(exported.len(), 2);
    let first = exported.iter().find(|e| e["title"] == "First").unwrap();
    assert_eq!(first["duration"], "3:00");
    assert_eq!(first["bpm"], 124);

    // Import of the export is a no-op
    let (_, body) = request(
        &app.router,
        "POST",
        "/api/v1/tracks/import/json",
        Some(body.clone()),
    )
    .await;
    assert_eq!(body["created"], 0);
}

#[tokio::test]
async fn enriched_tracks_expose_playlist_and_library_state() {
    let app = spawn_app().await;
    let track_id = create_track(&app.router, "Artist", "Song", 180_000).await;
    let candidate_id = create_candidate(&app.router, track_id, "vid1").await;
    request(
        &app.router,
        "POST",
        &format!("/api/v1/candidates/{candidate_id}/choose"),
        None,
    )
    .await;

    let (status, body) = request(&app.router, "GET", "/api/v1/tracks/with_playlist_info", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    let row = rows.iter().find(|r| r["id"].as_i64() == Some(track_id)).unwrap();
    assert_eq!(row["has_library_file"], false);
    assert_eq!(row["chosen_candidate_id"].as_i64(), Some(candidate_id));
    assert!(row["playlists"].as_array().unwrap().is_empty());

    // With a chosen candidate and no file it is ready for download
    let (_, body) = request(&app.router, "GET", "/api/v1/tracks/ready_for_download", None).await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|t| t["id"].as_i64() == Some(track_id)));
}
