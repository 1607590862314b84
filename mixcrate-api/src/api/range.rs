//! HTTP byte-range parsing
//!
//! Single-range `bytes=start-end` support with suffix (`bytes=-N`) and
//! open-ended (`bytes=N-`) forms. Out-of-bounds ends clamp to the last byte;
//! a start past EOF is unsatisfiable.

use mixcrate_common::{Error, Result};

/// Parsed inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parse a `Range` header value against a file size. `None` when the header
/// is absent; an error when malformed or unsatisfiable.
pub fn parse_range(header: Option<&str>, file_size: u64) -> Result<Option<ByteRange>> {
    let Some(value) = header else {
        return Ok(None);
    };
    let value = value.trim();
    let Some(spec) = value.strip_prefix("bytes=") else {
        return Err(Error::InvalidInput("Unsupported range unit".into()));
    };
    if spec.contains(',') {
        return Err(Error::InvalidInput("Multiple ranges not supported".into()));
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return Err(Error::InvalidInput("Invalid range format".into()));
    };
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    if start_str.is_empty() && end_str.is_empty() {
        return Err(Error::InvalidInput("Invalid empty range".into()));
    }

    if start_str.is_empty() {
        // suffix form: last N bytes
        let suffix: u64 = end_str
            .parse()
            .map_err(|_| Error::InvalidInput("Invalid suffix range".into()))?;
        if suffix == 0 {
            return Err(Error::InvalidInput("Invalid suffix length".into()));
        }
        let start = file_size.saturating_sub(suffix);
        return Ok(Some(ByteRange { start, end: file_size.saturating_sub(1) }));
    }

    let start: u64 = start_str
        .parse()
        .map_err(|_| Error::InvalidInput("Invalid start value".into()))?;
    if start >= file_size {
        return Err(Error::InvalidInput("Start out of range".into()));
    }

    let end = if end_str.is_empty() {
        file_size - 1
    } else {
        let end: u64 = end_str
            .parse()
            .map_err(|_| Error::InvalidInput("Invalid end value".into()))?;
        if end < start {
            return Err(Error::InvalidInput("End before start".into()));
        }
        end.min(file_size - 1)
    };

    Ok(Some(ByteRange { start, end }))
}

/// Audio MIME for a library file path
pub fn audio_mime(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}
