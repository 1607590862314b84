//! Streaming endpoint byte-range contract

mod helpers;

use axum::http::StatusCode;
use chrono::Utc;

use helpers::{create_track, request, request_raw, spawn_app, TestApp};

/// A 10 000-byte library file registered for a fresh track
async fn seeded_file(app: &TestApp) -> (i64, Vec<u8>) {
    let track_id = create_track(&app.router, "Stream Artist", "Stream Song", 180_000).await;

    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let path = app.library_dir.path().join("Stream Artist - Stream Song.mp3");
    std::fs::write(&path, &body).unwrap();

    let file = mixcrate_common::db::library::upsert_by_filepath(
        &app.state.db,
        track_id,
        &path.to_string_lossy(),
        body.len() as i64,
        Utc::now(),
        "checksum",
        "mp3",
    )
    .await
    .unwrap();
    (file.id, body)
}

#[tokio::test]
async fn unranged_request_returns_the_full_body() {
    let app = spawn_app().await;
    let (file_id, body) = seeded_file(&app).await;

    let (status, headers, received) = request_raw(
        &app.router,
        "GET",
        &format!("/api/v1/library/files/{file_id}/stream"),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(received.len(), 10_000);
    assert_eq!(received, body);
    assert_eq!(headers["content-length"], "10000");
    assert_eq!(headers["accept-ranges"], "bytes");
    assert_eq!(headers["content-type"], "audio/mpeg");
    assert!(headers.contains_key("etag"));
    assert!(headers.contains_key("last-modified"));
}

#[tokio::test]
async fn ranged_request_returns_206_with_exact_content_range() {
    let app = spawn_app().await;
    let (file_id, body) = seeded_file(&app).await;

    let (status, headers, received) = request_raw(
        &app.router,
        "GET",
        &format!("/api/v1/library/files/{file_id}/stream"),
        &[("range", "bytes=0-99")],
    )
    .await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(received.len(), 100);
    assert_eq!(received, &body[0..100]);
    assert_eq!(headers["content-range"], "bytes 0-99/10000");
    assert_eq!(headers["content-length"], "100");
}

#[tokio::test]
async fn split_ranges_concatenate_to_the_full_body() {
    let app = spawn_app().await;
    let (file_id, body) = seeded_file(&app).await;
    let uri = format!("/api/v1/library/files/{file_id}/stream");

    let (status, headers, first) =
        request_raw(&app.router, "GET", &uri, &[("range", "bytes=0-4999")]).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers["content-range"], "bytes 0-4999/10000");

    let (status, headers, second) =
        request_raw(&app.router, "GET", &uri, &[("range", "bytes=5000-9999")]).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers["content-range"], "bytes 5000-9999/10000");

    let mut joined = first;
    joined.extend(second);
    assert_eq!(joined, body);
}

#[tokio::test]
async fn suffix_and_open_ended_ranges_work() {
    let app = spawn_app().await;
    let (file_id, body) = seeded_file(&app).await;
    let uri = format!("/api/v1/library/files/{file_id}/stream");

    let (status, headers, tail) =
        request_raw(&app.router, "GET", &uri, &[("range", "bytes=-100")]).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers["content-range"], "bytes 9900-9999/10000");
    assert_eq!(tail, &body[9900..]);

    let (status, headers, rest) =
        request_raw(&app.router, "GET", &uri, &[("range", "bytes=9000-")]).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers["content-range"], "bytes 9000-9999/10000");
    assert_eq!(rest, &body[9000..]);
}

#[tokio::test]
async fn unsatisfiable_range_gets_416() {
    let app = spawn_app().await;
    let (file_id, _) = seeded_file(&app).await;

    let (status, headers, _) = request_raw(
        &app.router,
        "GET",
        &format!("/api/v1/library/files/{file_id}/stream"),
        &[("range", "bytes=99999-")],
    )
    .await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers["content-range"], "bytes */10000");
}

#[tokio::test]
async fn etag_is_stable_between_requests() {
    let app = spawn_app().await;
    let (file_id, _) = seeded_file(&app).await;
    let uri = format!("/api/v1/library/files/{file_id}/stream");

    let (_, first_headers, _) = request_raw(&app.router, "GET", &uri, &[]).await;
    let (_, second_headers, _) = request_raw(&app.router, "GET", &uri, &[]).await;
    assert_eq!(first_headers["etag"], second_headers["etag"]);
}

#[tokio::test]
async fn download_endpoint_serves_an_attachment() {
    let app = spawn_app().await;
    let (file_id, body) = seeded_file(&app).await;

    let (status, headers, received) = request_raw(
        &app.router,
        "GET",
        &format!("/api/v1/library/files/{file_id}/download"),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received, body);
    assert!(headers["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
}

#[tokio::test]
async fn missing_file_on_disk_is_a_404() {
    let app = spawn_app().await;
    let (file_id, _) = seeded_file(&app).await;

    // Remove the file behind the row
    let (_, file) = request(
        &app.router,
        "GET",
        &format!("/api/v1/library/files/{file_id}"),
        None,
    )
    .await;
    std::fs::remove_file(file["filepath"].as_str().unwrap()).unwrap();

    let (status, _, _) = request_raw(
        &app.router,
        "GET",
        &format!("/api/v1/library/files/{file_id}/stream"),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // resync drops the stale row
    let (_, body) = request(&app.router, "POST", "/api/v1/library/files/resync", None).await;
    assert_eq!(body["removed"], 1);
}
