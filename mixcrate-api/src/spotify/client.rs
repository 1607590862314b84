//! Spotify Web API client
//!
//! Minimal surface the sync ingestor needs: list the user's playlists, page
//! through a playlist's tracks, and the two token flows. All calls go
//! through the [`CatalogProvider`] trait so tests run against a fixture.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use mixcrate_common::{Error, Result};

const API_BASE: &str = "https://api.spotify.com/v1";
pub const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// A playlist as the provider reports it
#[derive(Debug, Clone)]
pub struct RemotePlaylist {
    pub provider_playlist_id: String,
    pub name: String,
    pub owner: Option<String>,
    /// Opaque change token; unchanged snapshot implies unchanged content
    pub snapshot: String,
}

/// One playlist entry with the track fields the catalog keeps
#[derive(Debug, Clone)]
pub struct RemoteTrackItem {
    pub provider_track_id: String,
    pub title: String,
    pub artists: String,
    pub album: Option<String>,
    pub cover_url: Option<String>,
    pub duration_ms: Option<i64>,
    pub isrc: Option<String>,
    pub explicit: bool,
    pub release_date: Option<NaiveDate>,
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

/// External streaming catalog capability
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn current_user_playlists(&self, access_token: &str) -> Result<Vec<RemotePlaylist>>;
    async fn playlist_tracks(
        &self,
        access_token: &str,
        provider_playlist_id: &str,
    ) -> Result<Vec<RemoteTrackItem>>;
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Marker for an expired/invalid access token; callers refresh once and retry
pub fn is_auth_expired(err: &Error) -> bool {
    matches!(err, Error::External(msg) if msg.starts_with("auth-expired"))
}

pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::External(format!("Spotify request failed: {e}")))?;
        match response.status().as_u16() {
            200 => response
                .json()
                .await
                .map_err(|e| Error::External(format!("Spotify response parse failed: {e}"))),
            401 => Err(Error::External("auth-expired: Spotify returned 401".into())),
            429 => Err(Error::External("Spotify rate limit (429)".into())),
            status => Err(Error::External(format!("Spotify returned {status}"))),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("Token request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!("Token endpoint returned {status}: {body}")));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Token response parse failed: {e}")))?;
        let access_token = value["access_token"]
            .as_str()
            .ok_or_else(|| Error::External("No access_token in response".into()))?
            .to_string();
        Ok(TokenResponse {
            access_token,
            refresh_token: value["refresh_token"].as_str().map(str::to_string),
            expires_in: value["expires_in"].as_i64().unwrap_or(3600),
            scope: value["scope"].as_str().map(str::to_string),
            token_type: value["token_type"].as_str().map(str::to_string),
        })
    }

    fn parse_release_date(album: &Value) -> Option<NaiveDate> {
        let raw = album["release_date"].as_str()?;
        match album["release_date_precision"].as_str() {
            Some("day") => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
            Some("month") => NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok(),
            Some("year") => NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d").ok(),
            _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        }
    }

    fn parse_track_item(item: &Value) -> Option<RemoteTrackItem> {
        let track = &item["track"];
        let provider_track_id = track["id"].as_str()?.to_string();
        let title = track["name"].as_str()?.to_string();
        let artists = track["artists"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|a| a["name"].as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|s| !s.is_empty())?;
        let album = &track["album"];
        // Largest image first in Spotify payloads
        let cover_url = album["images"]
            .as_array()
            .and_then(|imgs| imgs.first())
            .and_then(|img| img["url"].as_str())
            .map(str::to_string);
        Some(RemoteTrackItem {
            provider_track_id,
            title,
            artists,
            album: album["name"].as_str().map(str::to_string),
            cover_url,
            duration_ms: track["duration_ms"].as_i64(),
            isrc: track["external_ids"]["isrc"].as_str().map(str::to_string),
            explicit: track["explicit"].as_bool().unwrap_or(false),
            release_date: Self::parse_release_date(album),
            added_at: item["added_at"]
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

#[async_trait]
impl CatalogProvider for SpotifyClient {
    async fn current_user_playlists(&self, access_token: &str) -> Result<Vec<RemotePlaylist>> {
        let mut playlists = Vec::new();
        let mut url = format!("{API_BASE}/me/playlists?limit=50");
        loop {
            let page = self.get_json(&url, access_token).await?;
            if let Some(items) = page["items"].as_array() {
                for item in items {
                    let (Some(id), Some(name), Some(snapshot)) = (
                        item["id"].as_str(),
                        item["name"].as_str(),
                        item["snapshot_id"].as_str(),
                    ) else {
                        continue;
                    };
                    playlists.push(RemotePlaylist {
                        provider_playlist_id: id.to_string(),
                        name: name.to_string(),
                        owner: item["owner"]["display_name"].as_str().map(str::to_string),
                        snapshot: snapshot.to_string(),
                    });
                }
            }
            match page["next"].as_str() {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }
        Ok(playlists)
    }

    async fn playlist_tracks(
        &self,
        access_token: &str,
        provider_playlist_id: &str,
    ) -> Result<Vec<RemoteTrackItem>> {
        let mut tracks = Vec::new();
        let mut url = format!("{API_BASE}/playlists/{provider_playlist_id}/tracks?limit=100");
        loop {
            let page = self.get_json(&url, access_token).await?;
            if let Some(items) = page["items"].as_array() {
                tracks.extend(items.iter().filter_map(Self::parse_track_item));
            }
            match page["next"].as_str() {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }
        Ok(tracks)
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_items_parse_the_playlist_payload() {
        let item: Value = serde_json::json!({
            "added_at": "2024-06-10T12:00:00Z",
            "track": {
                "id": "download_test_track",
                "name": "Download Test Song",
                "artists": [{"name": "Test Artist"}, {"name": "Guest"}],
                "album": {
                    "name": "Test Album",
                    "images": [{"url": "https://i.scdn.co/image/x", "width": 300}],
                    "release_date": "2023-03-20",
                    "release_date_precision": "day"
                },
                "duration_ms": 200000,
                "external_ids": {"isrc": "TESTDOWNLOAD1"},
                "explicit": false
            }
        });
        let parsed = SpotifyClient::parse_track_item(&item).unwrap();
        assert_eq!(parsed.provider_track_id, "download_test_track");
        assert_eq!(parsed.artists, "Test Artist, Guest");
        assert_eq!(parsed.isrc.as_deref(), Some("TESTDOWNLOAD1"));
        assert_eq!(
            parsed.release_date,
            NaiveDate::from_ymd_opt(2023, 3, 20)
        );
        assert_eq!(parsed.added_at.unwrap().to_rfc3339(), "2024-06-10T12:00:00+00:00");
    }

    #[test]
    fn month_and_year_precision_dates_are_padded() {
        let album = serde_json::json!({
            "release_date": "2023-03", "release_date_precision": "month"
        });
        assert_eq!(
            SpotifyClient::parse_release_date(&album),
            NaiveDate::from_ymd_opt(2023, 3, 1)
        );
        let album = serde_json::json!({
            "release_date": "1999", "release_date_precision": "year"
        });
        assert_eq!(
            SpotifyClient::parse_release_date(&album),
            NaiveDate::from_ymd_opt(1999, 1, 1)
        );
    }

    #[test]
    fn items_without_a_track_id_are_dropped() {
        let item = serde_json::json!({"added_at": null, "track": {"id": null, "name": "x"}});
        assert!(SpotifyClient::parse_track_item(&item).is_none());
    }
}
