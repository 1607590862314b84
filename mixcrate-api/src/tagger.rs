//! Container metadata and cover art
//!
//! After a successful extraction the file carries no source metadata (the
//! remux drops it); this module writes the canonical tags from the catalog
//! row and embeds cover art. MPEG audio gets ID3v2.3 with an ID3v1 block
//! appended; MP4 audio gets the generic atom equivalents.
//!
//! Cover selection: a Spotify-origin cover URL wins over whatever thumbnail
//! the extractor embedded; without one the extractor thumbnail is kept;
//! otherwise no art. Cover failures never fail the job.

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use id3::{frame, TagLike, Version};
use lofty::config::WriteOptions;
use lofty::file::{FileType, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{Tag as LoftyTag, TagType};
use tracing::{debug, warn};

use mixcrate_common::db::Track;
use mixcrate_common::{Error, Result};

/// Host pattern identifying Spotify-served cover art
const SPOTIFY_COVER_HOST: &str = "i.scdn.co/";

/// True when the URL points at Spotify-served cover art
pub fn is_spotify_cover(url: &str) -> bool {
    url.contains(SPOTIFY_COVER_HOST)
}

/// Cover bytes with their mime, from whichever source won the selection rule
struct CoverArt {
    mime: String,
    data: Vec<u8>,
}

pub struct Tagger {
    http: reqwest::Client,
}

impl Default for Tagger {
    fn default() -> Self {
        Self::new()
    }
}

impl Tagger {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Rewrite the file's tags from the track row and embed cover art
    pub async fn tag_file(&self, path: &Path, track: &Track) -> Result<()> {
        let spotify_cover = track.cover_url.as_deref().filter(|url| is_spotify_cover(url));

        let fetched = match spotify_cover {
            Some(url) => match self.fetch_cover(url).await {
                Ok(cover) => Some(cover),
                Err(e) => {
                    warn!(track_id = track.id, "Cover download failed: {e}");
                    None
                }
            },
            None => None,
        };
        let prefer_fetched = fetched.is_some();

        let path = path.to_path_buf();
        let track = track.clone();
        tokio::task::spawn_blocking(move || write_tags_blocking(&path, &track, fetched, prefer_fetched))
            .await
            .map_err(|e| Error::Internal(format!("Tag task panicked: {e}")))?
    }

    async fn fetch_cover(&self, url: &str) -> Result<CoverArt> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("Cover fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Cover fetch returned {}",
                response.status()
            )));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|m| m.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        let data = response
            .bytes()
            .await
            .map_err(|e| Error::External(format!("Cover body read failed: {e}")))?
            .to_vec();
        Ok(CoverArt { mime, data })
    }
}

fn is_mpeg(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("mp3")
    )
}

fn write_tags_blocking(
    path: &PathBuf,
    track: &Track,
    fetched: Option<CoverArt>,
    prefer_fetched: bool,
) -> Result<()> {
    if is_mpeg(path) {
        write_id3_tags(path, track, fetched, prefer_fetched)
    } else {
        write_generic_tags(path, track, fetched, prefer_fetched)
    }
}

/// ID3v2.3 frames for MPEG audio, plus an appended ID3v1 block
fn write_id3_tags(
    path: &PathBuf,
    track: &Track,
    fetched: Option<CoverArt>,
    prefer_fetched: bool,
) -> Result<()> {
    // Carry the extractor thumbnail over unless the Spotify cover wins
    let existing_art = id3::Tag::read_from_path(path)
        .ok()
        .and_then(|tag| tag.pictures().next().cloned());

    // A fresh tag drops every remaining source-derived frame
    let mut tag = id3::Tag::new();
    tag.set_text("TPE1", track.artists.clone());
    tag.set_text("TIT2", track.title.clone());
    if let Some(album) = &track.album {
        tag.set_text("TALB", album.clone());
    }
    if let Some(genre) = &track.genre {
        tag.set_text("TCON", genre.clone());
    }
    if let Some(bpm) = track.bpm {
        tag.set_text("TBPM", bpm.to_string());
    }
    if let Some(date) = track.release_date {
        let date_str = date.format("%Y-%m-%d").to_string();
        // Full date in the grouping frame, mirrored into the date/year frames
        tag.set_text("TIT1", date_str.clone());
        tag.set_text("TDRC", date_str.clone());
        tag.set_text("TDAT", date.format("%d%m").to_string());
        tag.set_text("TYER", date.format("%Y").to_string());
    } else if let Some(year) = track.year {
        tag.set_text("TYER", year.to_string());
    }

    let art = if prefer_fetched {
        fetched.map(|c| (c.mime, c.data))
    } else {
        existing_art
            .map(|p| (p.mime_type, p.data))
            .or_else(|| fetched.map(|c| (c.mime, c.data)))
    };
    if let Some((mime, data)) = art {
        tag.add_frame(frame::Picture {
            mime_type: mime,
            picture_type: frame::PictureType::CoverFront,
            description: String::new(),
            data,
        });
    } else {
        debug!(track_id = track.id, "No cover art available");
    }

    tag.write_to_path(path, Version::Id3v23)
        .map_err(|e| Error::Extractor(format!("Tag write failed for {}: {e}", path.display())))?;

    append_id3v1(path, track)?;
    Ok(())
}

/// Generic lofty tag for MP4 (and any other non-MPEG) audio
fn write_generic_tags(
    path: &PathBuf,
    track: &Track,
    fetched: Option<CoverArt>,
    prefer_fetched: bool,
) -> Result<()> {
    let tagged = Probe::open(path)
        .map_err(|e| Error::Extractor(format!("Cannot open {} for tagging: {e}", path.display())))?
        .read()
        .map_err(|e| Error::Extractor(format!("Cannot parse {}: {e}", path.display())))?;

    let tag_type = match tagged.file_type() {
        FileType::Mp4 => TagType::Mp4Ilst,
        other => other.primary_tag_type(),
    };

    let existing_art = tagged
        .tags()
        .iter()
        .flat_map(|t| t.pictures())
        .next()
        .cloned();

    let mut tag = LoftyTag::new(tag_type);
    tag.set_artist(track.artists.clone());
    tag.set_title(track.title.clone());
    if let Some(album) = &track.album {
        tag.set_album(album.clone());
    }
    if let Some(genre) = &track.genre {
        tag.set_genre(genre.clone());
    }
    if let Some(bpm) = track.bpm {
        tag.insert_text(ItemKey::Bpm, bpm.to_string());
    }
    if let Some(date) = track.release_date {
        let date_str = date.format("%Y-%m-%d").to_string();
        tag.insert_text(ItemKey::ContentGroup, date_str.clone());
        tag.insert_text(ItemKey::RecordingDate, date_str);
        tag.insert_text(ItemKey::Year, date.format("%Y").to_string());
    } else if let Some(year) = track.year {
        tag.insert_text(ItemKey::Year, year.to_string());
    }

    let art = if prefer_fetched {
        fetched.map(cover_to_picture)
    } else {
        existing_art.or_else(|| fetched.map(cover_to_picture))
    };
    match art {
        Some(picture) => tag.push_picture(picture),
        None => debug!(track_id = track.id, "No cover art available"),
    }

    tag.save_to_path(path, WriteOptions::default().remove_others(true))
        .map_err(|e| Error::Extractor(format!("Tag write failed for {}: {e}", path.display())))?;
    Ok(())
}

fn cover_to_picture(cover: CoverArt) -> Picture {
    let mime = match cover.mime.as_str() {
        "image/png" => MimeType::Png,
        _ => MimeType::Jpeg,
    };
    Picture::new_unchecked(PictureType::CoverFront, Some(mime), None, cover.data)
}

/// ID3v1 is a fixed 128-byte block at the end of the file: "TAG", then
/// 30-byte title/artist/album, 4-byte year, 30-byte comment, genre byte
fn append_id3v1(path: &Path, track: &Track) -> Result<()> {
    fn field<const N: usize>(text: &str) -> [u8; N] {
        let mut out = [0u8; N];
        for (i, b) in text.bytes().take(N).enumerate() {
            out[i] = b;
        }
        out
    }

    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;

    // Replace an existing v1 block instead of stacking a second one
    let len = file.metadata()?.len();
    if len >= 128 {
        use std::io::Read;
        let mut marker = [0u8; 3];
        file.seek(SeekFrom::End(-128))?;
        file.read_exact(&mut marker)?;
        if &marker == b"TAG" {
            file.set_len(len - 128)?;
        }
    }

    let mut block = Vec::with_capacity(128);
    block.extend_from_slice(b"TAG");
    block.extend_from_slice(&field::<30>(&track.title));
    block.extend_from_slice(&field::<30>(&track.artists));
    block.extend_from_slice(&field::<30>(track.album.as_deref().unwrap_or("")));
    let year = track
        .release_date
        .map(|d| d.format("%Y").to_string())
        .or_else(|| track.year.map(|y| y.to_string()))
        .unwrap_or_default();
    block.extend_from_slice(&field::<4>(&year));
    block.extend_from_slice(&field::<30>(""));
    block.push(255); // genre: none

    file.seek(SeekFrom::End(0))?;
    file.write_all(&block)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn track() -> Track {
        Track {
            id: 1,
            title: "Lonely Heart".to_string(),
            artists: "Block & Crown".to_string(),
            album: Some("Singles".to_string()),
            genre: Some("House".to_string()),
            bpm: Some(124),
            duration_ms: Some(240_000),
            isrc: None,
            year: None,
            release_date: chrono::NaiveDate::from_ymd_opt(2023, 5, 14),
            spotify_added_at: None,
            explicit: false,
            cover_url: None,
            normalized_title: "lonely heart".to_string(),
            normalized_artists: "block & crown".to_string(),
            searched_not_found: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn spotify_cover_detection() {
        assert!(is_spotify_cover("https://i.scdn.co/image/ab67616d"));
        assert!(!is_spotify_cover("https://img.youtube.com/vi/x/hqdefault.jpg"));
        assert!(!is_spotify_cover(""));
    }

    #[test]
    fn id3v1_block_is_appended_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"ID3\x03\x00\x00\x00\x00\x00\x00payload").unwrap();
        let base_len = std::fs::metadata(&path).unwrap().len();

        let t = track();
        append_id3v1(&path, &t).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), base_len + 128);

        // A second write replaces the block rather than stacking another
        append_id3v1(&path, &t).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), base_len + 128);

        let data = std::fs::read(&path).unwrap();
        let block = &data[data.len() - 128..];
        assert_eq!(&block[..3], b"TAG");
        assert_eq!(&block[3..15], b"Lonely Heart");
        assert_eq!(&block[93..97], b"2023");
    }

    #[test]
    fn id3v23_tags_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        // Valid-enough MPEG shell for the id3 crate to tag
        std::fs::write(&path, [0xFFu8, 0xFB, 0x90, 0x00, 0, 0, 0, 0]).unwrap();

        let t = track();
        write_id3_tags(&path.clone(), &t, None, false).unwrap();

        let tag = id3::Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.version(), Version::Id3v23);
        assert_eq!(tag.artist(), Some("Block & Crown"));
        assert_eq!(tag.title(), Some("Lonely Heart"));
        assert_eq!(tag.album(), Some("Singles"));
        assert_eq!(
            tag.get("TIT1").and_then(|f| f.content().text()),
            Some("2023-05-14")
        );
        assert_eq!(
            tag.get("TYER").and_then(|f| f.content().text()),
            Some("2023")
        );
        assert_eq!(
            tag.get("TBPM").and_then(|f| f.content().text()),
            Some("124")
        );
    }
}
