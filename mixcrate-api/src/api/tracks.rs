//! Track endpoints: catalog CRUD, normalization preview, platform search,
//! cover refresh, JSON import/export

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use mixcrate_common::db::{self, NewCandidate, NewTrack, SearchProvider, Track, TrackIdentity};
use mixcrate_common::normalize::{normalize_track, NormalizedTrack};
use mixcrate_common::Error;

use crate::error::ApiResult;
use crate::search::search_and_rank;
use crate::tagger::is_spotify_cover;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    200
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Track>>> {
    let limit = query.limit.clamp(1, 1000);
    Ok(Json(db::tracks::list_tracks(&state.db, limit, query.offset.max(0)).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewTrack>,
) -> ApiResult<Json<Track>> {
    if payload.title.trim().is_empty() || payload.artists.trim().is_empty() {
        return Err(Error::InvalidInput("artists and title are required".into()).into());
    }
    Ok(Json(db::tracks::create_track(&state.db, &payload).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> ApiResult<Json<Track>> {
    Ok(Json(db::tracks::get_track(&state.db, track_id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(payload): Json<NewTrack>,
) -> ApiResult<Json<Track>> {
    Ok(Json(db::tracks::update_track(&state.db, track_id, &payload).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    db::tracks::delete_track(&state.db, track_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ============================================================================
// Normalizer preview
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NormalizeQuery {
    pub artists: String,
    pub title: String,
}

pub async fn normalize_preview(
    Query(query): Query<NormalizeQuery>,
) -> Json<NormalizedTrack> {
    Json(normalize_track(&query.artists, &query.title))
}

// ============================================================================
// Enriched listings
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PlaylistRef {
    pub playlist_id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TrackWithPlaylistInfo {
    #[serde(flatten)]
    pub track: Track,
    pub playlists: Vec<PlaylistRef>,
    pub has_library_file: bool,
    pub chosen_candidate_id: Option<i64>,
}

pub async fn with_playlist_info(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<TrackWithPlaylistInfo>>> {
    let limit = query.limit.clamp(1, 1000);
    let tracks = db::tracks::list_tracks(&state.db, limit, query.offset.max(0)).await?;
    let ids: Vec<i64> = tracks.iter().map(|t| t.id).collect();
    let memberships = db::playlists::memberships(&state.db, &ids).await?;

    let mut enriched = Vec::with_capacity(tracks.len());
    for track in tracks {
        let playlists = memberships
            .iter()
            .filter(|m| m.track_id == track.id)
            .map(|m| PlaylistRef { playlist_id: m.playlist_id, name: m.playlist_name.clone() })
            .collect();
        let has_library_file = db::library::exists_for_track(&state.db, track.id).await?;
        let chosen_candidate_id = db::candidates::chosen_for_track(&state.db, track.id)
            .await?
            .map(|c| c.id);
        enriched.push(TrackWithPlaylistInfo {
            track,
            playlists,
            has_library_file,
            chosen_candidate_id,
        });
    }
    Ok(Json(enriched))
}

pub async fn ready_for_download(State(state): State<AppState>) -> ApiResult<Json<Vec<Track>>> {
    Ok(Json(db::tracks::ready_for_download(&state.db).await?))
}

pub async fn track_identities(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> ApiResult<Json<Vec<TrackIdentity>>> {
    db::tracks::get_track(&state.db, track_id).await?;
    Ok(Json(db::identities::list_for_track(&state.db, track_id).await?))
}

// ============================================================================
// Platform search
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub prefer_extended: bool,
    #[serde(default)]
    pub persist: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseCandidate {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
    pub score: Value,
    pub candidate_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub track_id: i64,
    pub persisted: bool,
    pub candidates: Vec<SearchResponseCandidate>,
}

/// How many ranked results `persist=true` stores as candidates
const PERSIST_TOP_K: usize = 5;

pub async fn youtube_search(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let track = db::tracks::get_track(&state.db, track_id).await?;
    let ranked = search_and_rank(
        state.scheduler.extractor().as_ref(),
        state.scheduler.ranking(),
        &state.settings,
        &track,
        query.prefer_extended,
        query.limit,
    )
    .await?;

    let mut candidates = Vec::with_capacity(ranked.len());
    for (index, item) in ranked.iter().enumerate() {
        let mut candidate_id = None;
        if query.persist && index < PERSIST_TOP_K {
            let row = db::candidates::upsert_candidate(
                &state.db,
                &NewCandidate {
                    track_id,
                    provider: SearchProvider::Youtube,
                    external_id: item.candidate.external_id.clone(),
                    url: item.candidate.url.clone(),
                    title: item.candidate.title.clone(),
                    channel: item.candidate.channel.clone(),
                    duration_sec: item.candidate.duration_sec,
                    score: item.total(),
                    score_breakdown: Some(item.breakdown.to_value().to_string()),
                },
            )
            .await?;
            candidate_id = Some(row.id);
        }
        candidates.push(SearchResponseCandidate {
            external_id: item.candidate.external_id.clone(),
            url: item.candidate.url.clone(),
            title: item.candidate.title.clone(),
            channel: item.candidate.channel.clone(),
            duration_sec: item.candidate.duration_sec,
            score: item.breakdown.to_value(),
            candidate_id,
        });
    }

    // Backfill a cover from the best result's thumbnail when the track has
    // none yet
    if query.persist && track.cover_url.is_none() {
        if let Some(top) = ranked.first() {
            let url = youtube_thumbnail_url(&top.candidate.external_id);
            db::tracks::set_cover_url(&state.db, track_id, &url).await?;
        }
    }

    Ok(Json(SearchResponse {
        track_id,
        persisted: query.persist,
        candidates,
    }))
}

fn youtube_thumbnail_url(external_id: &str) -> String {
    format!("https://img.youtube.com/vi/{external_id}/hqdefault.jpg")
}

// ============================================================================
// Cover refresh
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CoverRefreshResponse {
    pub track_id: i64,
    pub cover_url: Option<String>,
    pub source: Option<&'static str>,
}

/// Refresh the cover URL from the Spotify identity (kept as-is when already
/// Spotify-served) or the chosen candidate's thumbnail
pub async fn cover_refresh(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> ApiResult<Json<CoverRefreshResponse>> {
    let track = db::tracks::get_track(&state.db, track_id).await?;

    if let Some(url) = track.cover_url.as_deref() {
        if is_spotify_cover(url) {
            return Ok(Json(CoverRefreshResponse {
                track_id,
                cover_url: track.cover_url,
                source: Some("spotify"),
            }));
        }
    }

    if let Some(chosen) = db::candidates::chosen_for_track(&state.db, track_id).await? {
        let url = youtube_thumbnail_url(&chosen.external_id);
        db::tracks::set_cover_url(&state.db, track_id, &url).await?;
        return Ok(Json(CoverRefreshResponse {
            track_id,
            cover_url: Some(url),
            source: Some("youtube"),
        }));
    }

    Ok(Json(CoverRefreshResponse { track_id, cover_url: track.cover_url, source: None }))
}

// ============================================================================
// JSON import / export
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct ImportItemError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub dry_run: bool,
    pub received: usize,
    pub valid: usize,
    pub errors: Vec<ImportItemError>,
    pub to_create_non_duplicates: usize,
    pub created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
}

/// `"m:ss"` (or bare seconds) to milliseconds
fn parse_duration_str(raw: Option<&Value>) -> Option<i64> {
    match raw {
        Some(Value::Number(n)) => n.as_f64().map(|secs| (secs * 1000.0) as i64),
        Some(Value::String(s)) => {
            let s = s.trim();
            let (minutes, seconds) = s.split_once(':')?;
            let minutes: i64 = minutes.parse().ok()?;
            let seconds: i64 = seconds.parse().ok()?;
            Some((minutes * 60 + seconds) * 1000)
        }
        _ => None,
    }
}

/// POST /tracks/import/json - import an array of track objects.
///
/// Requires `artists` and `title`; `genre`, `bpm` and `duration` ("m:ss")
/// are optional. Duplicates (normalized pair, then raw case-insensitive) are
/// reported and skipped.
pub async fn import_json(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<ImportResponse>> {
    let Some(items) = payload.as_array() else {
        return Err(Error::InvalidInput("Root JSON must be an array".into()).into());
    };

    let mut errors = Vec::new();
    let mut to_create: Vec<(NewTrack, bool)> = Vec::new();

    for (index, raw) in items.iter().enumerate() {
        let Some(object) = raw.as_object() else {
            errors.push(ImportItemError { index, error: "Item is not an object".into() });
            continue;
        };
        let artists = object.get("artists").and_then(Value::as_str).unwrap_or("").trim();
        let title = object.get("title").and_then(Value::as_str).unwrap_or("").trim();
        if artists.is_empty() || title.is_empty() {
            errors.push(ImportItemError {
                index,
                error: "Missing required field(s): artists, title".into(),
            });
            continue;
        }
        let bpm = match object.get("bpm") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    errors.push(ImportItemError { index, error: format!("Invalid BPM: {s}") });
                    continue;
                }
            },
            Some(other) => {
                errors.push(ImportItemError { index, error: format!("Invalid BPM: {other}") });
                continue;
            }
        };
        if matches!(bpm, Some(v) if v <= 0) {
            errors.push(ImportItemError { index, error: "BPM must be > 0".into() });
            continue;
        }

        let new = NewTrack {
            title: title.to_string(),
            artists: artists.to_string(),
            genre: object
                .get("genre")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            bpm,
            duration_ms: parse_duration_str(object.get("duration")),
            ..NewTrack::default()
        };

        let norm = normalize_track(&new.artists, &new.title);
        let duplicate = db::tracks::find_by_normalized(
            &state.db,
            &norm.normalized_artists,
            &norm.normalized_title,
        )
        .await?
        .is_some()
            || db::tracks::find_by_raw(&state.db, &new.artists, &new.title)
                .await?
                .is_some()
            || to_create.iter().any(|(pending, _)| {
                let pending_norm = normalize_track(&pending.artists, &pending.title);
                pending_norm.normalized_artists == norm.normalized_artists
                    && pending_norm.normalized_title == norm.normalized_title
            });
        to_create.push((new, duplicate));
    }

    let mut created = 0;
    if !query.dry_run {
        for (new, duplicate) in &to_create {
            if *duplicate {
                continue;
            }
            db::tracks::create_track(&state.db, new).await?;
            created += 1;
        }
    }

    let non_duplicates = to_create.iter().filter(|(_, dup)| !dup).count();
    let items_out = query.dry_run.then(|| {
        to_create
            .iter()
            .map(|(new, duplicate)| {
                serde_json::json!({
                    "artists": new.artists,
                    "title": new.title,
                    "genre": new.genre,
                    "bpm": new.bpm,
                    "duration_ms": new.duration_ms,
                    "duplicate": duplicate,
                })
            })
            .collect()
    });

    Ok(Json(ImportResponse {
        dry_run: query.dry_run,
        received: items.len(),
        valid: to_create.len(),
        errors,
        to_create_non_duplicates: non_duplicates,
        created,
        items: items_out,
    }))
}

/// GET /tracks/export - the import-supported subset, for round-tripping
pub async fn export(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    let tracks = db::tracks::list_tracks(&state.db, 10_000, 0).await?;
    let exported = tracks
        .into_iter()
        .map(|t| {
            let duration = t.duration_ms.map(|ms| {
                let total_sec = ms / 1000;
                format!("{}:{:02}", total_sec / 60, total_sec % 60)
            });
            serde_json::json!({
                "artists": t.artists,
                "title": t.title,
                "genre": t.genre,
                "bpm": t.bpm,
                "duration": duration,
            })
        })
        .collect();
    Ok(Json(exported))
}
