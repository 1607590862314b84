//! Sync ingestor
//!
//! Incremental, idempotent reconciliation of provider playlists into the
//! catalog, keyed by the provider's opaque snapshot token. Playlists whose
//! snapshot is unchanged since the last sync are skipped (unless forced);
//! changed ones get track upserts (dedup by ISRC, then by the normalized
//! artist/title pair), identity creation, and link reconciliation.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use mixcrate_common::db::{self, NewTrack, SourceProvider, Track};
use mixcrate_common::{crypto, Error, Result};

use super::client::{is_auth_expired, CatalogProvider, RemotePlaylist, RemoteTrackItem};

/// Per-playlist reconciliation report
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistSyncSummary {
    pub playlist_id: i64,
    pub name: String,
    pub skipped: bool,
    pub tracks_created: usize,
    pub tracks_updated: usize,
    pub links_created: usize,
    pub links_removed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub playlists: Vec<PlaylistSyncSummary>,
    pub tracks_created: usize,
    pub tracks_updated: usize,
    pub links_created: usize,
    pub links_removed: usize,
    pub skipped: usize,
}

/// The stored access token for the account
async fn access_token_for(pool: &SqlitePool, account_id: i64) -> Result<String> {
    let token = db::accounts::get_token(pool, account_id, SourceProvider::Spotify)
        .await?
        .ok_or_else(|| Error::NotFound(format!("No token for account {account_id}")))?;
    Ok(token.access_token)
}

/// Run `call` with the stored token; on auth-expired, refresh once and retry
async fn with_refresh<T, F, Fut>(
    pool: &SqlitePool,
    provider: &dyn CatalogProvider,
    secret_key: &str,
    account_id: i64,
    call: F,
) -> Result<T>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let access_token = access_token_for(pool, account_id).await?;
    match call(access_token).await {
        Err(e) if is_auth_expired(&e) => {
            let token = db::accounts::get_token(pool, account_id, SourceProvider::Spotify)
                .await?
                .ok_or_else(|| Error::NotFound(format!("No token for account {account_id}")))?;
            let encrypted = token
                .refresh_token_encrypted
                .ok_or_else(|| Error::External("auth expired and no refresh token stored".into()))?;
            let refresh_token = crypto::decrypt_text(secret_key, &encrypted)?;
            let refreshed = provider.refresh_token(&refresh_token).await?;
            let new_encrypted = refreshed
                .refresh_token
                .as_deref()
                .map(|t| crypto::encrypt_text(secret_key, t));
            db::accounts::upsert_token(
                pool,
                account_id,
                SourceProvider::Spotify,
                &refreshed.access_token,
                new_encrypted.as_deref(),
                refreshed.scope.as_deref(),
                refreshed.token_type.as_deref(),
                Some(chrono::Utc::now() + chrono::Duration::seconds(refreshed.expires_in)),
            )
            .await?;
            info!(account_id, "Access token refreshed after expiry");
            call(refreshed.access_token).await
        }
        other => other,
    }
}

/// Discover the account's playlists at the provider, optionally persisting
/// them into the catalog
pub async fn discover_playlists(
    pool: &SqlitePool,
    provider: &dyn CatalogProvider,
    secret_key: &str,
    account_id: i64,
    persist: bool,
) -> Result<Vec<RemotePlaylist>> {
    db::accounts::get_account(pool, account_id).await?;
    let remote = with_refresh(pool, provider, secret_key, account_id, |token| async move {
        provider.current_user_playlists(&token).await
    })
    .await?;

    if persist {
        for playlist in &remote {
            // Snapshot deliberately not written here: a first sync after
            // discovery must still see the playlist as changed
            db::playlists::upsert_provider_playlist(
                pool,
                account_id,
                SourceProvider::Spotify,
                &playlist.provider_playlist_id,
                &playlist.name,
                playlist.owner.as_deref(),
            )
            .await?;
        }
    }
    Ok(remote)
}

/// Sync every selected playlist of the account
pub async fn sync_account(
    pool: &SqlitePool,
    provider: &dyn CatalogProvider,
    secret_key: &str,
    account_id: i64,
    force: bool,
) -> Result<SyncSummary> {
    db::accounts::get_account(pool, account_id).await?;

    let remote_playlists =
        with_refresh(pool, provider, secret_key, account_id, |token| async move {
            provider.current_user_playlists(&token).await
        })
        .await?;

    let selected: Vec<_> = db::playlists::list_playlists(pool, true)
        .await?
        .into_iter()
        .filter(|p| p.source_account_id == Some(account_id))
        .collect();

    let mut summary = SyncSummary::default();
    for local in selected {
        let Some(ppid) = local.provider_playlist_id.clone() else { continue };
        let Some(remote) = remote_playlists
            .iter()
            .find(|r| r.provider_playlist_id == ppid)
        else {
            warn!(playlist_id = local.id, "Playlist no longer exists at provider");
            continue;
        };

        if !force && local.snapshot.as_deref() == Some(remote.snapshot.as_str()) {
            summary.playlists.push(PlaylistSyncSummary {
                playlist_id: local.id,
                name: local.name.clone(),
                skipped: true,
                tracks_created: 0,
                tracks_updated: 0,
                links_created: 0,
                links_removed: 0,
            });
            summary.skipped += 1;
            continue;
        }

        let items = with_refresh(pool, provider, secret_key, account_id, |token| {
            let ppid = ppid.clone();
            async move { provider.playlist_tracks(&token, &ppid).await }
        })
        .await?;

        let playlist_summary = reconcile_playlist(pool, local.id, &local.name, &items).await?;
        db::playlists::set_snapshot(pool, local.id, &remote.snapshot).await?;

        summary.tracks_created += playlist_summary.tracks_created;
        summary.tracks_updated += playlist_summary.tracks_updated;
        summary.links_created += playlist_summary.links_created;
        summary.links_removed += playlist_summary.links_removed;
        summary.playlists.push(playlist_summary);
    }
    Ok(summary)
}

/// Upsert tracks and reconcile membership links for one playlist
async fn reconcile_playlist(
    pool: &SqlitePool,
    playlist_id: i64,
    name: &str,
    items: &[RemoteTrackItem],
) -> Result<PlaylistSyncSummary> {
    let mut summary = PlaylistSyncSummary {
        playlist_id,
        name: name.to_string(),
        skipped: false,
        tracks_created: 0,
        tracks_updated: 0,
        links_created: 0,
        links_removed: 0,
    };

    let mut present_track_ids = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let (track, _created) = upsert_track(pool, item, &mut summary).await?;
        db::identities::ensure_identity(
            pool,
            track.id,
            SourceProvider::Spotify,
            &item.provider_track_id,
            Some(&format!(
                "https://open.spotify.com/track/{}",
                item.provider_track_id
            )),
        )
        .await?;

        let (_, link_created) = db::playlists::upsert_link(
            pool,
            playlist_id,
            track.id,
            Some(position as i64),
            item.added_at,
        )
        .await?;
        if link_created {
            summary.links_created += 1;
        }
        present_track_ids.push(track.id);
    }

    summary.links_removed +=
        db::playlists::remove_links_not_in(pool, playlist_id, &present_track_ids).await? as usize;

    Ok(summary)
}

/// Track dedup: ISRC first, then the normalized pair; otherwise create
async fn upsert_track(
    pool: &SqlitePool,
    item: &RemoteTrackItem,
    summary: &mut PlaylistSyncSummary,
) -> Result<(Track, bool)> {
    let existing = match &item.isrc {
        Some(isrc) => db::tracks::find_by_isrc(pool, isrc).await?,
        None => None,
    };
    let existing = match existing {
        Some(track) => Some(track),
        None => {
            let norm = mixcrate_common::normalize::normalize_track(&item.artists, &item.title);
            db::tracks::find_by_normalized(pool, &norm.normalized_artists, &norm.normalized_title)
                .await?
        }
    };

    if let Some(track) = existing {
        // Enrich fields the catalog is still missing
        let new = NewTrack {
            title: track.title.clone(),
            artists: track.artists.clone(),
            album: track.album.clone().or_else(|| item.album.clone()),
            genre: track.genre.clone(),
            bpm: track.bpm,
            duration_ms: track.duration_ms.or(item.duration_ms),
            isrc: track.isrc.clone().or_else(|| item.isrc.clone()),
            year: track.year,
            release_date: track.release_date.or(item.release_date),
            spotify_added_at: track.spotify_added_at.or(item.added_at),
            explicit: track.explicit || item.explicit,
            cover_url: track.cover_url.clone().or_else(|| item.cover_url.clone()),
        };
        let changed = new.album != track.album
            || new.duration_ms != track.duration_ms
            || new.isrc != track.isrc
            || new.release_date != track.release_date
            || new.spotify_added_at != track.spotify_added_at
            || new.cover_url != track.cover_url
            || new.explicit != track.explicit;
        if changed {
            let updated = db::tracks::update_track(pool, track.id, &new).await?;
            summary.tracks_updated += 1;
            return Ok((updated, false));
        }
        return Ok((track, false));
    }

    let created = db::tracks::create_track(
        pool,
        &NewTrack {
            title: item.title.clone(),
            artists: item.artists.clone(),
            album: item.album.clone(),
            genre: None,
            bpm: None,
            duration_ms: item.duration_ms,
            isrc: item.isrc.clone(),
            year: item.release_date.map(|d| {
                use chrono::Datelike;
                d.year() as i64
            }),
            release_date: item.release_date,
            spotify_added_at: item.added_at,
            explicit: item.explicit,
            cover_url: item.cover_url.clone(),
        },
    )
    .await?;
    summary.tracks_created += 1;
    Ok((created, true))
}
