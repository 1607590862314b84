//! Track metadata normalization
//!
//! Pure, deterministic helpers mapping raw `(artists, title)` strings to
//! canonical forms used for deduplication and candidate ranking:
//! - unify collaboration separators and remove featured-artist markers
//!   (featured names found in the title are attributed to the artist list)
//! - strip bracketed content and version notes from titles
//! - extract remix/live/remaster flags
//! - strip accents and punctuation, lowercase for the `normalized_*` fields

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static X_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:\s+x\s+|\s*×\s*)").unwrap());
static PLUS_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\+\s*").unwrap());
static SLASH_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*/\s*").unwrap());
static AND_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\band\b\s*").unwrap());
static WITH_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\bwith\b\s*").unwrap());
static FEAT_SEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(?:featuring|feat|ft)\b\.?\s*").unwrap());
static AMP_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*&\s*(?:&\s*)*").unwrap());
static COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").unwrap());
static EDGE_AMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:& )+|(?: &)+$").unwrap());

/// Featured-artist mention inside a title, capturing the names that follow
static TITLE_FEAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[(\[]?\b(?:featuring|feat|ft)\b\.?\s*(?P<names>[^()\[\]\-–—]+)[)\]]?")
        .unwrap()
});
static PARENS_CONTENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
/// Trailing ` - descriptor` suffix (handles -, –, —); these usually carry
/// version info like "Radio Edit" or "Live at Wembley"
static DASH_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[-–—]\s*[^-–—()]+$").unwrap());
static VERSION_NOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:extended mix|club mix|original mix|radio edit|edit|remix|live(?: version)?|remastered?(?: \d{2,4})?)\b",
    )
    .unwrap()
});
static REMIX_FLAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:remix|edit|mix)\b").unwrap());
static LIVE_FLAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blive\b").unwrap());
static REMASTER_FLAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bremaster(?:ed)?\b").unwrap());
static PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9&,+/'\- ]+").unwrap());
static PRIMARY_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[,&]\s*").unwrap());

/// Canonical form of a track's `(artists, title)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTrack {
    pub primary_artist: String,
    pub clean_artists: String,
    pub clean_title: String,
    pub normalized_artists: String,
    pub normalized_title: String,
    pub is_remix_or_edit: bool,
    pub is_live: bool,
    pub is_remaster: bool,
}

fn collapse_ws(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Replace unicode dash variants with a plain hyphen and collapse whitespace.
/// Spacing is kept otherwise so names like "Jay-Z" survive.
fn normalize_dash_variants(text: &str) -> String {
    collapse_ws(&text.replace('–', "-").replace('—', "-"))
}

/// Unify collaboration separators to a canonical ` & ` form.
///
/// `x` (whitespace-delimited), `×`, `+`, `/`, `and`, `with` and featured
/// markers all become `&`; commas are kept. Runs of separators collapse.
fn normalize_artist_separators(artists: &str) -> String {
    let mut s = normalize_dash_variants(artists);
    s = X_SEP_RE.replace_all(&s, " & ").into_owned();
    s = PLUS_SEP_RE.replace_all(&s, " & ").into_owned();
    s = SLASH_SEP_RE.replace_all(&s, " & ").into_owned();
    s = AND_SEP_RE.replace_all(&s, " & ").into_owned();
    s = WITH_SEP_RE.replace_all(&s, " & ").into_owned();
    s = FEAT_SEP_RE.replace_all(&s, " & ").into_owned();
    s = AMP_RUN_RE.replace_all(&s, " & ").into_owned();
    s = COMMA_RE.replace_all(&s, ", ").into_owned();
    s = collapse_ws(&s);
    EDGE_AMP_RE.replace_all(&s, "").into_owned()
}

/// Remove accents: NFKD decomposition with combining marks dropped, plus the
/// few letters that do not decompose
pub fn strip_accents(text: &str) -> String {
    let decomposed: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let mut out = String::with_capacity(decomposed.len());
    for ch in decomposed.chars() {
        match ch {
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("Ae"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("Oe"),
            'ß' => out.push_str("ss"),
            'đ' | 'ð' => out.push('d'),
            'Đ' | 'Ð' => out.push('D'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            _ => out.push(ch),
        }
    }
    out
}

fn clean_punctuation(text: &str) -> String {
    collapse_ws(&PUNCT_RE.replace_all(text, " "))
}

fn extract_primary_artist(clean_artists: &str) -> String {
    PRIMARY_SPLIT_RE
        .split(clean_artists)
        .next()
        .unwrap_or(clean_artists)
        .trim()
        .to_string()
}

/// Normalize an `(artists, title)` pair.
///
/// Deterministic and idempotent over its own output: feeding
/// `clean_artists`/`clean_title` back in reproduces the normalized fields.
pub fn normalize_track(artists: &str, title: &str) -> NormalizedTrack {
    let orig_artists = normalize_artist_separators(artists);
    let orig_title = normalize_dash_variants(title);

    // Featured names in the title belong to the artist list
    let mut artists_full = orig_artists.clone();
    let title_wo_feat = match TITLE_FEAT_RE.captures(&orig_title) {
        Some(caps) => {
            let names = normalize_artist_separators(&caps["names"]);
            if !names.is_empty() && !artists_full.to_lowercase().contains(&names.to_lowercase()) {
                if artists_full.is_empty() {
                    artists_full = names;
                } else {
                    artists_full = format!("{artists_full} & {names}");
                }
            }
            TITLE_FEAT_RE.replace_all(&orig_title, "").into_owned()
        }
        None => orig_title.clone(),
    };

    // Bracketed content and dash suffixes usually carry version info
    let mut title_base = PARENS_CONTENT_RE.replace_all(&title_wo_feat, "").into_owned();
    title_base = DASH_SUFFIX_RE.replace_all(&title_base, "").into_owned();

    // Flags come from the original strings so bracketed keywords are not lost
    let flags_src = format!("{orig_title} {orig_artists}");
    let is_remix_or_edit = REMIX_FLAG_RE.is_match(&flags_src);
    let is_live = LIVE_FLAG_RE.is_match(&flags_src);
    let is_remaster = REMASTER_FLAG_RE.is_match(&flags_src);

    title_base = VERSION_NOTE_RE.replace_all(&title_base, "").into_owned();

    let artists_no_accents = normalize_artist_separators(&strip_accents(&artists_full));
    let title_no_accents = strip_accents(&title_base);

    let clean_artists = clean_punctuation(&artists_no_accents);
    let clean_title = clean_punctuation(&title_no_accents);

    let primary_artist = extract_primary_artist(&clean_artists);

    NormalizedTrack {
        normalized_artists: clean_artists.to_lowercase(),
        normalized_title: clean_title.to_lowercase(),
        primary_artist,
        clean_artists,
        clean_title,
        is_remix_or_edit,
        is_live,
        is_remaster,
    }
}

/// Whitespace tokenization of an already-normalized string, lowercased
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(|t| t.to_lowercase())
}

/// True when both durations are present and within `tolerance_ms`
pub fn durations_close_ms(a_ms: Option<i64>, b_ms: Option<i64>, tolerance_ms: i64) -> bool {
    match (a_ms, b_ms) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance_ms.max(0),
        _ => false,
    }
}

/// Absolute delta in seconds when both durations are present
pub fn duration_delta_sec(a_ms: Option<i64>, b_ms: Option<i64>) -> Option<f64> {
    match (a_ms, b_ms) {
        (Some(a), Some(b)) => Some((a - b).abs() as f64 / 1000.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feat_and_parens_are_stripped() {
        let n = normalize_track("Artist feat. Guest", "Title (Remastered 2012) - Radio Edit");
        assert_eq!(n.primary_artist, "Artist");
        assert!(n.is_remaster);
        assert!(n.is_remix_or_edit);
        assert_eq!(n.clean_title, "Title");
        assert_eq!(n.normalized_artists, "artist & guest");
        assert_eq!(n.normalized_title, "title");
    }

    #[test]
    fn live_mix_accents_and_delimiters() {
        let n = normalize_track("Beyoncé & Jay-Z", "Halo - Live at Wembley (Extended Mix)");
        assert_eq!(n.primary_artist, "Beyonce");
        assert!(n.is_live);
        assert!(n.is_remix_or_edit);
        assert_eq!(n.clean_title, "Halo");
        assert_eq!(n.normalized_artists, "beyonce & jay-z");
    }

    #[test]
    fn x_separator_requires_word_boundaries() {
        let cases = [
            ("Ausmax", "Ausmax", "Ausmax"),
            ("Phoenix", "Phoenix", "Phoenix"),
            ("Artist x Another", "Artist", "Artist & Another"),
            ("Artist   x   Another", "Artist", "Artist & Another"),
            ("Artist × Another", "Artist", "Artist & Another"),
            ("Artist X Another", "Artist", "Artist & Another"),
            ("Artist feat. Someone x Another", "Artist", "Artist & Someone & Another"),
        ];
        for (artists, primary, clean) in cases {
            let n = normalize_track(artists, "Title");
            assert_eq!(n.primary_artist, primary, "input: {artists}");
            assert_eq!(n.clean_artists, clean, "input: {artists}");
        }
    }

    #[test]
    fn featured_names_in_title_attributed_to_artists() {
        let n = normalize_track("Main", "Song (feat. Guest)");
        assert_eq!(n.normalized_artists, "main & guest");
        assert_eq!(n.normalized_title, "song");
    }

    #[test]
    fn normalization_is_idempotent() {
        for (artists, title) in [
            ("Block & Crown", "Lonely Heart"),
            ("Artist feat. Guest x Other", "Tune (Extended Mix)"),
            ("Beyoncé and Jay-Z", "Halo - Live"),
        ] {
            let once = normalize_track(artists, title);
            let twice = normalize_track(&once.clean_artists, &once.clean_title);
            assert_eq!(once.normalized_artists, twice.normalized_artists);
            assert_eq!(once.normalized_title, twice.normalized_title);
            assert_eq!(once.primary_artist, twice.primary_artist);
        }
    }

    #[test]
    fn duration_helpers() {
        assert!(durations_close_ms(Some(180_000), Some(181_500), 2000));
        assert!(!durations_close_ms(Some(180_000), Some(184_000), 2000));
        assert!(!durations_close_ms(None, Some(1000), 2000));
        assert_eq!(duration_delta_sec(Some(2000), Some(1500)), Some(0.5));
        assert_eq!(duration_delta_sec(None, Some(1500)), None);
    }
}
