//! Cookie jar management
//!
//! The extractor can use a Netscape-format cookie file for age-restricted
//! content. These endpoints report and manage that file; cookie values are
//! masked everywhere.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use mixcrate_common::Error;

use crate::error::ApiResult;
use crate::AppState;

/// Cookies the platform requires for age-restricted extraction
const REQUIRED_COOKIES: &[&str] = &["__Secure-1PSID", "__Secure-3PSID", "LOGIN_INFO"];
const IMPORTANT_COOKIES: &[&str] = &["SID", "HSID", "SSID", "APISID", "SAPISID"];

#[derive(Debug, Serialize)]
pub struct CookiesStatus {
    pub configured: bool,
    pub file_path: Option<String>,
    pub file_exists: bool,
    pub file_size: Option<u64>,
    pub line_count: Option<usize>,
}

fn cookie_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            // Netscape format: domain, flag, path, secure, expiry, name, value
            (fields.len() >= 7).then(|| fields[5].to_string())
        })
        .collect()
}

/// GET /settings/cookies - configuration status, no values
pub async fn cookies_status(State(state): State<AppState>) -> ApiResult<Json<CookiesStatus>> {
    let Some(path) = &state.settings.cookies_file else {
        return Ok(Json(CookiesStatus {
            configured: false,
            file_path: None,
            file_exists: false,
            file_size: None,
            line_count: None,
        }));
    };
    let exists = path.is_file();
    let (size, lines) = if exists {
        let size = std::fs::metadata(path).map(|m| m.len()).ok();
        let lines = std::fs::read_to_string(path)
            .map(|content| cookie_names(&content).len())
            .ok();
        (size, lines)
    } else {
        (None, None)
    };
    Ok(Json(CookiesStatus {
        configured: exists && size.unwrap_or(0) > 0,
        file_path: Some(path.to_string_lossy().to_string()),
        file_exists: exists,
        file_size: size,
        line_count: lines,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CookiesUpload {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CookiesUploadResponse {
    pub success: bool,
    pub cookie_count: usize,
}

/// POST /settings/cookies - write the cookie jar (Netscape format)
pub async fn cookies_upload(
    State(state): State<AppState>,
    Json(payload): Json<CookiesUpload>,
) -> ApiResult<Json<CookiesUploadResponse>> {
    if payload.content.trim().is_empty() {
        return Err(Error::InvalidInput("Cookie content cannot be empty".into()).into());
    }
    let names = cookie_names(&payload.content);
    if names.is_empty() {
        return Err(Error::InvalidInput(
            "Invalid cookies format; expected Netscape tab-separated fields".into(),
        )
        .into());
    }
    let Some(path) = &state.settings.cookies_file else {
        return Err(Error::Config("YT_DLP_COOKIES_FILE is not configured".into()).into());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::from)?;
    }
    std::fs::write(path, &payload.content).map_err(Error::from)?;
    Ok(Json(CookiesUploadResponse { success: true, cookie_count: names.len() }))
}

#[derive(Debug, Serialize)]
pub struct CookiesDeleteResponse {
    pub success: bool,
}

/// DELETE /settings/cookies
pub async fn cookies_delete(State(state): State<AppState>) -> ApiResult<Json<CookiesDeleteResponse>> {
    if let Some(path) = &state.settings.cookies_file {
        if path.is_file() {
            std::fs::remove_file(path).map_err(Error::from)?;
        }
    }
    Ok(Json(CookiesDeleteResponse { success: true }))
}

#[derive(Debug, Serialize)]
pub struct CookiesCheck {
    pub valid: bool,
    pub found_required: Vec<String>,
    pub missing_required: Vec<String>,
    pub found_important: Vec<String>,
    pub total_cookies: usize,
}

/// GET /settings/cookies/check - report whether the known-required cookie
/// names are present, without exposing values
pub async fn cookies_check(State(state): State<AppState>) -> ApiResult<Json<CookiesCheck>> {
    let content = state
        .settings
        .cookies_file
        .as_ref()
        .filter(|p| p.is_file())
        .and_then(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_default();
    let names = cookie_names(&content);

    let found_required: Vec<String> = REQUIRED_COOKIES
        .iter()
        .filter(|c| names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
        .collect();
    let missing_required: Vec<String> = REQUIRED_COOKIES
        .iter()
        .filter(|c| !names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
        .collect();
    let found_important: Vec<String> = IMPORTANT_COOKIES
        .iter()
        .filter(|c| names.iter().any(|n| n == *c))
        .map(|c| c.to_string())
        .collect();

    Ok(Json(CookiesCheck {
        valid: missing_required.is_empty() && !names.is_empty(),
        found_required,
        missing_required,
        found_important,
        total_cookies: names.len(),
    }))
}
