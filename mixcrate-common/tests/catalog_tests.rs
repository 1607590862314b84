//! Catalog invariant tests over an in-memory database

use mixcrate_common::db::{self, DownloadStatus, NewCandidate, NewTrack, SearchProvider};

async fn pool() -> sqlx::SqlitePool {
    db::init_database("sqlite::memory:").await.unwrap()
}

fn new_track(artists: &str, title: &str) -> NewTrack {
    NewTrack {
        artists: artists.to_string(),
        title: title.to_string(),
        ..NewTrack::default()
    }
}

fn new_candidate(track_id: i64, external_id: &str, score: f64) -> NewCandidate {
    NewCandidate {
        track_id,
        provider: SearchProvider::Youtube,
        external_id: external_id.to_string(),
        url: format!("https://youtu.be/{external_id}"),
        title: "Upload".to_string(),
        channel: None,
        duration_sec: Some(200),
        score,
        score_breakdown: None,
    }
}

#[tokio::test]
async fn creating_a_track_creates_its_manual_identity() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();

    let identities = db::identities::list_for_track(&pool, track.id).await.unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].provider_track_id, format!("manual:{}", track.id));

    assert_eq!(track.normalized_artists, "artist");
    assert_eq!(track.normalized_title, "song");
}

#[tokio::test]
async fn chosen_candidate_is_unique_per_track() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();
    let a = db::candidates::upsert_candidate(&pool, &new_candidate(track.id, "a", 10.0))
        .await
        .unwrap();
    let b = db::candidates::upsert_candidate(&pool, &new_candidate(track.id, "b", 20.0))
        .await
        .unwrap();

    db::candidates::choose_candidate(&pool, a.id).await.unwrap();
    db::candidates::choose_candidate(&pool, b.id).await.unwrap();

    let chosen: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM search_candidates WHERE track_id = ? AND chosen = 1",
    )
    .bind(track.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(chosen, 1);
    assert!(db::candidates::get_candidate(&pool, b.id).await.unwrap().chosen);
    assert!(!db::candidates::get_candidate(&pool, a.id).await.unwrap().chosen);
}

#[tokio::test]
async fn candidate_upsert_refreshes_on_conflict() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();

    let first = db::candidates::upsert_candidate(&pool, &new_candidate(track.id, "a", 10.0))
        .await
        .unwrap();
    let second = db::candidates::upsert_candidate(&pool, &new_candidate(track.id, "a", 42.0))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.score, 42.0);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_candidates")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn deleting_a_track_cascades_all_owned_rows() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();
    let candidate = db::candidates::upsert_candidate(&pool, &new_candidate(track.id, "a", 1.0))
        .await
        .unwrap();
    db::downloads::create_download(&pool, track.id, Some(candidate.id), DownloadStatus::Queued)
        .await
        .unwrap();
    db::library::upsert_by_filepath(
        &pool,
        track.id,
        "/music/Artist - Song.mp3",
        100,
        chrono::Utc::now(),
        "sum",
        "mp3",
    )
    .await
    .unwrap();

    db::tracks::delete_track(&pool, track.id).await.unwrap();

    for table in ["track_identities", "search_candidates", "downloads", "library_files"] {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE track_id = ?"))
                .bind(track.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 0, "{table} not cascaded");
    }
}

#[tokio::test]
async fn download_status_transitions_are_guarded() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();
    let row = db::downloads::create_download(&pool, track.id, None, DownloadStatus::Queued)
        .await
        .unwrap();

    // queued -> skipped works once
    assert!(db::downloads::mark_skipped(&pool, row.id).await.unwrap());
    assert!(!db::downloads::mark_skipped(&pool, row.id).await.unwrap());
    // a skipped job cannot start running
    assert!(!db::downloads::mark_running(&pool, row.id).await.unwrap());

    let row2 = db::downloads::create_download(&pool, track.id, None, DownloadStatus::Queued)
        .await
        .unwrap();
    assert!(db::downloads::mark_running(&pool, row2.id).await.unwrap());
    // and a running one cannot be skipped
    assert!(!db::downloads::mark_skipped(&pool, row2.id).await.unwrap());
}

#[tokio::test]
async fn history_trim_spares_non_terminal_rows() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();

    for _ in 0..5 {
        db::downloads::create_download(&pool, track.id, None, DownloadStatus::Already)
            .await
            .unwrap();
    }
    let queued = db::downloads::create_download(&pool, track.id, None, DownloadStatus::Queued)
        .await
        .unwrap();

    let trimmed = db::downloads::trim_history(&pool, 2).await.unwrap();
    assert_eq!(trimmed, 3);

    let remaining = db::downloads::list_downloads(&pool, None, None, 100, 0).await.unwrap();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().any(|d| d.id == queued.id), "queued row never trimmed");
}

#[tokio::test]
async fn playlist_links_are_idempotent_and_removal_preserves_tracks() {
    let pool = pool().await;
    let playlist = db::playlists::create_playlist(
        &pool,
        mixcrate_common::db::SourceProvider::Manual,
        "List",
        None,
    )
    .await
    .unwrap();
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();

    let (_, created) =
        db::playlists::upsert_link(&pool, playlist.id, track.id, Some(0), None).await.unwrap();
    assert!(created);
    let (link, created) =
        db::playlists::upsert_link(&pool, playlist.id, track.id, Some(3), None).await.unwrap();
    assert!(!created);
    assert_eq!(link.position, Some(3));

    let removed = db::playlists::remove_links_not_in(&pool, playlist.id, &[]).await.unwrap();
    assert_eq!(removed, 1);
    // link removal never cascades to the track
    assert!(db::tracks::get_track(&pool, track.id).await.is_ok());
}

#[tokio::test]
async fn library_upsert_is_keyed_by_filepath() {
    let pool = pool().await;
    let track = db::tracks::create_track(&pool, &new_track("Artist", "Song")).await.unwrap();

    let first = db::library::upsert_by_filepath(
        &pool,
        track.id,
        "/music/a.mp3",
        100,
        chrono::Utc::now(),
        "one",
        "mp3",
    )
    .await
    .unwrap();
    let second = db::library::upsert_by_filepath(
        &pool,
        track.id,
        "/music/a.mp3",
        200,
        chrono::Utc::now(),
        "two",
        "mp3",
    )
    .await
    .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.file_size, Some(200));
    assert_eq!(second.checksum_sha256.as_deref(), Some("two"));
}

#[tokio::test]
async fn ready_for_download_requires_chosen_and_no_file() {
    let pool = pool().await;
    let ready = db::tracks::create_track(&pool, &new_track("A", "One")).await.unwrap();
    let candidate = db::candidates::upsert_candidate(&pool, &new_candidate(ready.id, "a", 1.0))
        .await
        .unwrap();
    db::candidates::choose_candidate(&pool, candidate.id).await.unwrap();

    let acquired = db::tracks::create_track(&pool, &new_track("B", "Two")).await.unwrap();
    let c2 = db::candidates::upsert_candidate(&pool, &new_candidate(acquired.id, "b", 1.0))
        .await
        .unwrap();
    db::candidates::choose_candidate(&pool, c2.id).await.unwrap();
    db::library::upsert_by_filepath(
        &pool,
        acquired.id,
        "/music/b.mp3",
        1,
        chrono::Utc::now(),
        "x",
        "mp3",
    )
    .await
    .unwrap();

    let unchosen = db::tracks::create_track(&pool, &new_track("C", "Three")).await.unwrap();

    let rows = db::tracks::ready_for_download(&pool).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|t| t.id).collect();
    assert!(ids.contains(&ready.id));
    assert!(!ids.contains(&acquired.id));
    assert!(!ids.contains(&unchosen.id));
}
