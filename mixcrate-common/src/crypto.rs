//! Refresh-token encryption at rest
//!
//! Tokens are stored with a scheme prefix: `enc:<fernet token>` when a
//! process key is configured, `plain:<text>` otherwise (development
//! fallback). The key is `SECRET_KEY`: either a ready-made urlsafe-base64
//! Fernet key, or any shorter string that gets zero-padded to 32 bytes.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use fernet::Fernet;

use crate::{Error, Result};

fn build_fernet(secret_key: &str) -> Option<Fernet> {
    let key = secret_key.trim();
    if key.is_empty() {
        return None;
    }
    // A full Fernet key is 32 bytes urlsafe-base64 (44 chars with padding)
    if key.len() >= 43 {
        if let Some(f) = Fernet::new(key) {
            return Some(f);
        }
    }
    let mut raw = key.as_bytes().to_vec();
    raw.resize(32, b'0');
    Fernet::new(&URL_SAFE.encode(raw))
}

/// Encrypt `plaintext` with the process key, or mark it `plain:` without one
pub fn encrypt_text(secret_key: &str, plaintext: &str) -> String {
    match build_fernet(secret_key) {
        Some(f) => format!("enc:{}", f.encrypt(plaintext.as_bytes())),
        None => format!("plain:{plaintext}"),
    }
}

/// Decrypt a stored token produced by [`encrypt_text`]
pub fn decrypt_text(secret_key: &str, stored: &str) -> Result<String> {
    if let Some(rest) = stored.strip_prefix("plain:") {
        return Ok(rest.to_string());
    }
    let Some(token) = stored.strip_prefix("enc:") else {
        // Legacy rows without a prefix are treated as plaintext
        return Ok(stored.to_string());
    };
    let fernet = build_fernet(secret_key)
        .ok_or_else(|| Error::Config("SECRET_KEY required to decrypt stored token".into()))?;
    let bytes = fernet
        .decrypt(token)
        .map_err(|_| Error::InvalidInput("Stored token failed decryption".into()))?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidInput("Decrypted token is not UTF-8".into()))
}
