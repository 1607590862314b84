//! Paged search + rank orchestration
//!
//! Wraps the extractor's flat search in the paging policy: grow the result
//! window page by page, stop early once the best-ranked total crosses the
//! configured threshold, and fall back to canned results when the extractor
//! comes back empty and the fallback fixture is enabled.

use std::collections::HashSet;

use tracing::{debug, info};

use mixcrate_common::config::Settings;
use mixcrate_common::db::Track;
use mixcrate_common::Result;

use crate::extractor::{Extractor, FixtureExtractor, RawResult};
use crate::ranking::{RankCandidate, RankQuery, RankedCandidate, RankingService};

fn to_rank_candidate(raw: &RawResult) -> RankCandidate {
    RankCandidate {
        external_id: raw.external_id.clone(),
        url: raw.url.clone(),
        title: raw.title.clone(),
        channel: raw.channel.clone(),
        duration_sec: raw.duration_sec,
    }
}

/// Search the platform for a track and return ranked candidates
pub async fn search_and_rank(
    extractor: &dyn Extractor,
    ranking: &RankingService,
    settings: &Settings,
    track: &Track,
    prefer_extended: bool,
    limit: Option<usize>,
) -> Result<Vec<RankedCandidate>> {
    let mut query_text = format!("{} {}", track.artists, track.title);
    if prefer_extended {
        query_text.push_str(" extended mix");
    }
    let query = RankQuery {
        artists: track.artists.clone(),
        title: track.title.clone(),
        duration_sec: track.duration_ms.map(|ms| ms / 1000),
    };

    let cap = limit.unwrap_or(settings.search_limit).max(1);
    let mut seen: HashSet<String> = HashSet::new();
    let mut collected: Vec<RawResult> = Vec::new();

    for page in 1..=settings.search_max_pages.max(1) {
        let window = (settings.search_page_size.max(1) * page).min(cap.max(settings.search_page_size));
        let mut results = extractor.search(&query_text, window).await?;

        if results.is_empty() && collected.is_empty() && settings.search_fallback_fake {
            info!(query = %query_text, "Search returned nothing; using canned fallback");
            results = FixtureExtractor::canned_results(&query_text);
        }

        let fetched = results.len();
        for raw in results {
            if seen.insert(raw.external_id.clone()) {
                collected.push(raw);
            }
        }

        let ranked = ranking.rank_candidates(
            &query,
            collected.iter().map(to_rank_candidate).collect(),
        );
        let best = ranked.first().map(|r| r.total()).unwrap_or(f64::MIN);
        debug!(page, candidates = collected.len(), best, "Search page ranked");

        if best >= settings.search_page_stop_threshold {
            break;
        }
        // Fewer results than the window means the platform is exhausted
        if fetched < window || collected.len() >= cap {
            break;
        }
    }

    let mut ranked = ranking.rank_candidates(
        &query,
        collected.iter().map(to_rank_candidate).collect(),
    );
    ranked.truncate(cap);
    Ok(ranked)
}
