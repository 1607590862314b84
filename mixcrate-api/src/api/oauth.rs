//! OAuth and source-account endpoints
//!
//! PKCE flow against the streaming provider. Refresh tokens are encrypted
//! before they reach the catalog; token values never appear in responses or
//! logs.

use axum::extract::{Query, State};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use mixcrate_common::db::{self, OAuthToken, SourceAccount, SourceProvider};
use mixcrate_common::{crypto, Error};

use crate::error::ApiResult;
use crate::spotify::AUTH_URL;
use crate::AppState;

fn b64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// RFC 7636 S256 verifier/challenge pair
fn generate_pkce() -> (String, String) {
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    let verifier = b64url(&raw);
    let challenge = b64url(&Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

fn generate_state() -> String {
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    b64url(&raw)
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountPayload {
    pub provider: SourceProvider,
    pub name: String,
}

pub async fn list_accounts(State(state): State<AppState>) -> ApiResult<Json<Vec<SourceAccount>>> {
    Ok(Json(db::accounts::list_accounts(&state.db).await?))
}

pub async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccountPayload>,
) -> ApiResult<Json<SourceAccount>> {
    if payload.name.trim().is_empty() {
        return Err(Error::InvalidInput("name is required".into()).into());
    }
    Ok(Json(db::accounts::ensure_account(&state.db, payload.provider, &payload.name).await?))
}

// ============================================================================
// Tokens
// ============================================================================

pub async fn list_tokens(State(state): State<AppState>) -> ApiResult<Json<Vec<OAuthToken>>> {
    // Serialization skips token values; only metadata leaves the process
    Ok(Json(db::accounts::list_tokens(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct StoreTokenPayload {
    pub source_account_id: i64,
    pub provider: SourceProvider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<i64>,
}

/// POST /oauth/tokens - store a token obtained out of band (tests, manual
/// setup)
pub async fn store_token(
    State(state): State<AppState>,
    Json(payload): Json<StoreTokenPayload>,
) -> ApiResult<Json<OAuthToken>> {
    db::accounts::get_account(&state.db, payload.source_account_id).await?;
    let encrypted = payload
        .refresh_token
        .as_deref()
        .map(|t| crypto::encrypt_text(&state.settings.secret_key, t));
    let expires_at = payload
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs));
    Ok(Json(
        db::accounts::upsert_token(
            &state.db,
            payload.source_account_id,
            payload.provider,
            &payload.access_token,
            encrypted.as_deref(),
            payload.scope.as_deref(),
            Some("Bearer"),
            expires_at,
        )
        .await?,
    ))
}

// ============================================================================
// Spotify PKCE flow
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub account_id: i64,
    pub redirect_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub authorize_url: String,
}

/// GET /oauth/spotify/authorize - begin the PKCE flow
pub async fn spotify_authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let account = db::accounts::get_account(&state.db, query.account_id).await?;
    if account.provider != SourceProvider::Spotify {
        return Err(Error::NotFound("Spotify account not found".into()).into());
    }
    let client_id = state
        .settings
        .spotify_client_id
        .as_deref()
        .ok_or_else(|| Error::Config("SPOTIFY_CLIENT_ID is not set".to_string()))?;
    let redirect_uri = state
        .settings
        .spotify_redirect_uri
        .as_deref()
        .ok_or_else(|| Error::Config("SPOTIFY_REDIRECT_URI is not set".to_string()))?;

    let (verifier, challenge) = generate_pkce();
    let oauth_state = generate_state();
    db::accounts::create_state(
        &state.db,
        SourceProvider::Spotify,
        query.account_id,
        &oauth_state,
        &verifier,
        query.redirect_to.as_deref(),
    )
    .await?;

    let scope = "playlist-read-private playlist-read-collaborative user-read-email";
    let authorize_url = format!(
        "{AUTH_URL}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge_method=S256&code_challenge={}",
        urlencode(client_id),
        urlencode(redirect_uri),
        urlencode(scope),
        urlencode(&oauth_state),
        urlencode(&challenge),
    );
    Ok(Json(AuthorizeResponse { authorize_url }))
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    pub redirect_to: Option<String>,
}

/// GET /oauth/spotify/callback - exchange the code, store the tokens
pub async fn spotify_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<CallbackResponse>> {
    let oauth_state = db::accounts::find_state(&state.db, &query.state)
        .await?
        .filter(|s| !s.consumed)
        .ok_or_else(|| Error::InvalidInput("Invalid state".into()))?;

    let tokens = state
        .provider
        .exchange_code(&query.code, &oauth_state.code_verifier)
        .await?;

    let encrypted = tokens
        .refresh_token
        .as_deref()
        .map(|t| crypto::encrypt_text(&state.settings.secret_key, t));
    db::accounts::upsert_token(
        &state.db,
        oauth_state.source_account_id,
        SourceProvider::Spotify,
        &tokens.access_token,
        encrypted.as_deref(),
        tokens.scope.as_deref(),
        tokens.token_type.as_deref(),
        Some(Utc::now() + Duration::seconds(tokens.expires_in)),
    )
    .await?;
    db::accounts::consume_state(&state.db, oauth_state.id).await?;

    Ok(Json(CallbackResponse { status: "ok", redirect_to: oauth_state.redirect_to }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub account_id: i64,
}

/// POST /oauth/spotify/refresh - explicit token refresh
pub async fn spotify_refresh(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<OAuthToken>> {
    let token = db::accounts::get_token(&state.db, query.account_id, SourceProvider::Spotify)
        .await?
        .ok_or_else(|| Error::NotFound("No token for this account".into()))?;
    let encrypted = token
        .refresh_token_encrypted
        .ok_or_else(|| Error::NotFound("No refresh token for this account".into()))?;
    let refresh_token = crypto::decrypt_text(&state.settings.secret_key, &encrypted)?;

    let refreshed = state.provider.refresh_token(&refresh_token).await?;
    let new_encrypted = refreshed
        .refresh_token
        .as_deref()
        .map(|t| crypto::encrypt_text(&state.settings.secret_key, t));
    Ok(Json(
        db::accounts::upsert_token(
            &state.db,
            query.account_id,
            SourceProvider::Spotify,
            &refreshed.access_token,
            new_encrypted.as_deref(),
            refreshed.scope.as_deref(),
            refreshed.token_type.as_deref(),
            Some(Utc::now() + Duration::seconds(refreshed.expires_in)),
        )
        .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct EnsureAccountPayload {
    pub name: Option<String>,
}

/// POST /oauth/spotify/ensure_account - find-or-create the default Spotify
/// account
pub async fn spotify_ensure_account(
    State(state): State<AppState>,
    Json(payload): Json<EnsureAccountPayload>,
) -> ApiResult<Json<SourceAccount>> {
    let name = payload.name.as_deref().unwrap_or("Spotify");
    Ok(Json(db::accounts::ensure_account(&state.db, SourceProvider::Spotify, name).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_pair_is_s256() {
        let (verifier, challenge) = generate_pkce();
        assert!(verifier.len() >= 43);
        let expected = b64url(&Sha256::digest(verifier.as_bytes()));
        assert_eq!(challenge, expected);
    }

    #[test]
    fn urlencoding_escapes_reserved_characters() {
        assert_eq!(urlencode("a b&c"), "a%20b%26c");
        assert_eq!(urlencode("safe-._~"), "safe-._~");
    }
}
