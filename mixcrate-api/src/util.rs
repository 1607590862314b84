//! Small shared helpers

use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use mixcrate_common::Result;

static UNSAFE_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]+"#).unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Sanitize a string for use as a filename, truncated to a sane length
pub fn safe_filename(text: &str) -> String {
    let replaced = UNSAFE_CHARS_RE.replace_all(text, "_");
    let collapsed = WS_RE.replace_all(&replaced, " ");
    let trimmed = collapsed.trim();
    trimmed.chars().take(180).collect()
}

/// SHA-256 hex digest of a file, streamed in 8 KiB chunks
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// First `max_lines` lines of subprocess stderr, bounded for storage in an
/// error message column
pub fn stderr_prefix(stderr: &str, max_lines: usize, max_bytes: usize) -> String {
    let mut prefix: String = stderr
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    if prefix.len() > max_bytes {
        let mut cut = max_bytes;
        while !prefix.is_char_boundary(cut) {
            cut -= 1;
        }
        prefix.truncate(cut);
    }
    prefix
}
