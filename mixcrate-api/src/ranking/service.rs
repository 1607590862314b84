//! Scoring implementation

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use mixcrate_common::normalize::strip_accents;

use super::config::RankingConfig;

/// Reference query a candidate list is ranked against
#[derive(Debug, Clone)]
pub struct RankQuery {
    pub artists: String,
    pub title: String,
    pub duration_sec: Option<i64>,
}

/// One raw search result
#[derive(Debug, Clone)]
pub struct RankCandidate {
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
}

/// Score family a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreFamily {
    Artist,
    Title,
    Extended,
    Duration,
}

/// One applied rule, displayed verbatim by consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDetail {
    pub key: String,
    pub value: f64,
    pub family: ScoreFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-family components plus the applied-rule log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub components: Components,
    pub details: Vec<ScoreDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Components {
    pub artist: f64,
    pub title: f64,
    pub extended: f64,
    pub duration: f64,
}

impl ScoreBreakdown {
    fn add_detail(&mut self, key: String, value: f64, family: ScoreFamily, note: Option<String>) {
        match family {
            ScoreFamily::Artist => self.components.artist += value,
            ScoreFamily::Title => self.components.title += value,
            ScoreFamily::Extended => self.components.extended += value,
            ScoreFamily::Duration => self.components.duration += value,
        }
        self.total += value;
        self.details.push(ScoreDetail { key, value, family, note });
    }

    /// JSON form with totals rounded to two decimals for display/storage
    pub fn to_value(&self) -> serde_json::Value {
        let round2 = |v: f64| (v * 100.0).round() / 100.0;
        serde_json::json!({
            "total": round2(self.total),
            "components": {
                "artist": round2(self.components.artist),
                "title": round2(self.components.title),
                "extended": round2(self.components.extended),
                "duration": round2(self.components.duration),
            },
            "details": self.details,
        })
    }
}

/// A candidate with its computed score, in ranked order
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: RankCandidate,
    pub breakdown: ScoreBreakdown,
}

impl RankedCandidate {
    pub fn total(&self) -> f64 {
        self.breakdown.total
    }
}

/// The ranking engine; all tuning comes from the injected [`RankingConfig`]
#[derive(Debug, Clone, Default)]
pub struct RankingService {
    config: RankingConfig,
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

/// Whitespace tokenization, lowercased. Standalone symbols like `&` survive.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(normalize_text).collect()
}

/// Tokens that carry words; bare punctuation left over from removals does not
/// count against the remaining-token penalty
fn is_substantive(token: &str) -> bool {
    token.chars().any(|c| c.is_alphanumeric())
}

/// Accent-folded, lowercased form for the fuzzy fallback comparison
fn fold_for_fuzzy(text: &str) -> String {
    strip_accents(&text.to_lowercase()).to_lowercase()
}

/// Case-insensitive find; on a hit, returns the text with the match removed
fn find_and_remove(text: &str, pattern: &str) -> (bool, String) {
    let haystack = normalize_text(text);
    let needle = normalize_text(pattern);
    if needle.is_empty() {
        return (false, haystack);
    }
    match haystack.find(&needle) {
        Some(idx) => {
            let mut remaining = String::with_capacity(haystack.len() - needle.len());
            remaining.push_str(&haystack[..idx]);
            remaining.push_str(&haystack[idx + needle.len()..]);
            (true, remaining.trim().to_string())
        }
        None => (false, haystack),
    }
}

impl RankingService {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    fn strip_official_suffixes(&self, channel: &str) -> String {
        let mut normalized = normalize_text(channel);
        for suffix in self.config.official_channel_suffixes {
            if let Some(stripped) = normalized.strip_suffix(suffix) {
                normalized = stripped.trim().to_string();
            }
        }
        normalized
    }

    /// Score every reference artist against the candidate title and channel.
    /// Title matches are removed from the working copy.
    fn score_artist(
        &self,
        artists: &str,
        channel: &str,
        mut working_title: String,
        breakdown: &mut ScoreBreakdown,
    ) -> String {
        for artist in artists.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let normalized_artist = normalize_text(artist);
            let normalized_channel = self.strip_official_suffixes(channel);

            let (found_in_title, new_working) = find_and_remove(&working_title, artist);
            let found_in_channel = normalized_channel.contains(&normalized_artist);

            if found_in_title || found_in_channel {
                breakdown.add_detail(
                    format!("artist.match:{artist}"),
                    self.config.artist_bonus_per_match,
                    ScoreFamily::Artist,
                    Some(format!(
                        "Found in {}",
                        if found_in_title { "title" } else { "channel" }
                    )),
                );
                if found_in_title {
                    working_title = new_working;
                }
                continue;
            }

            // Fallback: accent-folded comparison (e.g. "Hørger" vs "Horger")
            let fuzzy_artist = fold_for_fuzzy(artist);
            let (fuzzy_in_title, fuzzy_working) = find_and_remove(&working_title, &fuzzy_artist);
            let fuzzy_in_channel =
                fold_for_fuzzy(&normalized_channel).contains(&fuzzy_artist);

            if fuzzy_in_title || fuzzy_in_channel {
                breakdown.add_detail(
                    format!("artist.fuzzy-match:{artist}"),
                    self.config.artist_bonus_per_fuzzy_match,
                    ScoreFamily::Artist,
                    Some(format!(
                        "Accent-folded match in {}",
                        if fuzzy_in_title { "title" } else { "channel" }
                    )),
                );
                if fuzzy_in_title {
                    working_title = fuzzy_working;
                }
            } else {
                breakdown.add_detail(
                    format!("artist.miss:{artist}"),
                    self.config.artist_penalty_per_miss,
                    ScoreFamily::Artist,
                    None,
                );
            }
        }
        working_title
    }

    /// Exact match consumes the whole title; otherwise per-token matching
    /// against the working copy
    fn score_title(
        &self,
        title: &str,
        working_title: &str,
        breakdown: &mut ScoreBreakdown,
    ) -> (String, HashSet<String>) {
        let normalized_title = normalize_text(title);
        let mut matched_tokens = HashSet::new();

        let (exact, new_working) = find_and_remove(working_title, title);
        if exact {
            breakdown.add_detail(
                "title.exact".to_string(),
                self.config.title_exact_match_bonus,
                ScoreFamily::Title,
                Some("Exact title match".to_string()),
            );
            matched_tokens.extend(tokenize(&normalized_title));
            return (new_working, matched_tokens);
        }

        let title_tokens = tokenize(&normalized_title);
        let mut working_tokens = tokenize(working_title);

        for token in title_tokens {
            if let Some(pos) = working_tokens.iter().position(|w| *w == token) {
                breakdown.add_detail(
                    format!("title.token:{token}"),
                    self.config.title_token_bonus_per_match,
                    ScoreFamily::Title,
                    None,
                );
                working_tokens.remove(pos);
                matched_tokens.insert(token);
            } else {
                breakdown.add_detail(
                    format!("title.miss:{token}"),
                    self.config.title_token_penalty_per_miss,
                    ScoreFamily::Title,
                    None,
                );
            }
        }

        (working_tokens.join(" "), matched_tokens)
    }

    fn detect_extended_keywords(&self, text: &str) -> Vec<&'static str> {
        let normalized = normalize_text(text);
        self.config
            .extended_keywords
            .iter()
            .copied()
            .filter(|k| normalized.contains(k))
            .collect()
    }

    /// Remaining-token penalty with the signed floor; `commit` controls
    /// whether details are recorded (the value is also needed up front to
    /// gate the extended bonus)
    fn remaining_penalty(
        &self,
        working_title: &str,
        extended_tokens: &HashSet<String>,
        breakdown: Option<&mut ScoreBreakdown>,
    ) -> f64 {
        let mut penalty = 0.0;
        let mut details = Vec::new();
        for token in tokenize(working_title) {
            // Compare on the punctuation-trimmed form so "(extended" still
            // counts as part of an extended mention
            let core = token.trim_matches(|c: char| !c.is_alphanumeric());
            if is_substantive(&token) && !extended_tokens.contains(core) {
                penalty += self.config.title_remaining_token_penalty;
                details.push(token);
            }
        }
        let mut capped_correction = None;
        if penalty < self.config.title_remaining_token_penalty_max {
            capped_correction = Some(penalty - self.config.title_remaining_token_penalty_max);
            penalty = self.config.title_remaining_token_penalty_max;
        }
        if let Some(breakdown) = breakdown {
            for token in details {
                breakdown.add_detail(
                    format!("title.remaining-token:{token}"),
                    self.config.title_remaining_token_penalty,
                    ScoreFamily::Title,
                    None,
                );
            }
            if let Some(correction) = capped_correction {
                breakdown.add_detail(
                    "title.remaining-capped".to_string(),
                    correction,
                    ScoreFamily::Title,
                    Some(format!(
                        "Penalty floored at {}",
                        self.config.title_remaining_token_penalty_max
                    )),
                );
            }
        }
        penalty
    }

    /// Extended-version bonus, gated on match quality
    #[allow(clippy::too_many_arguments)]
    fn score_extended(
        &self,
        working_title: &str,
        artist_score: f64,
        title_score: f64,
        remaining_penalty: f64,
        candidate_duration: i64,
        query_duration: i64,
        breakdown: &mut ScoreBreakdown,
    ) -> HashSet<String> {
        let keywords = self.detect_extended_keywords(working_title);
        let mut extended_tokens = HashSet::new();
        if keywords.is_empty() {
            return extended_tokens;
        }
        for keyword in &keywords {
            extended_tokens.extend(tokenize(keyword));
        }

        let conditions_met = remaining_penalty.abs()
            <= self.config.extended_max_remaining_penalty_allowed
            && artist_score >= self.config.extended_min_artist_score
            && title_score >= self.config.extended_min_title_score;

        let joined = keywords.join(", ");
        if conditions_met {
            breakdown.add_detail(
                format!("extended.detected:{joined}"),
                self.config.extended_large_bonus,
                ScoreFamily::Extended,
                Some("Extended version detected with sufficient match quality".to_string()),
            );
            if candidate_duration > 0
                && query_duration > 0
                && (candidate_duration as f64)
                    > (query_duration as f64) * self.config.extended_duration_factor
            {
                breakdown.add_detail(
                    "extended.duration-bonus".to_string(),
                    self.config.extended_duration_bonus,
                    ScoreFamily::Extended,
                    Some("Extended version with appropriately long duration".to_string()),
                );
            }
        } else {
            breakdown.add_detail(
                format!("extended.rejected:{joined}"),
                0.0,
                ScoreFamily::Extended,
                Some(format!(
                    "Conditions not met (artist:{artist_score:.0}, title:{title_score:.0}, remaining:{remaining_penalty:.0})"
                )),
            );
        }
        extended_tokens
    }

    fn score_duration(
        &self,
        query_duration: i64,
        candidate_duration: i64,
        breakdown: &mut ScoreBreakdown,
    ) {
        if candidate_duration < query_duration {
            breakdown.add_detail(
                "duration.too-short".to_string(),
                self.config.duration_penalty_too_short,
                ScoreFamily::Duration,
                Some(format!(
                    "Candidate shorter than query ({candidate_duration}s < {query_duration}s)"
                )),
            );
            return;
        }
        if candidate_duration == query_duration {
            breakdown.add_detail(
                "duration.exact".to_string(),
                0.0,
                ScoreFamily::Duration,
                Some("Exact duration match".to_string()),
            );
            return;
        }

        let delta = candidate_duration - query_duration;
        let max_delta =
            ((query_duration as f64) * (self.config.duration_max_ratio - 1.0)) as i64;

        if delta <= max_delta {
            // Longer versions in range are likely extended cuts
            let bonus = (self.config.duration_min_bonus
                + delta as f64 * self.config.duration_bonus_per_second)
                .min(self.config.duration_max_bonus);
            breakdown.add_detail(
                format!("duration.bonus:+{delta}s"),
                bonus,
                ScoreFamily::Duration,
                Some("Longer but within acceptable range".to_string()),
            );
        } else {
            let ratio = if query_duration > 0 {
                candidate_duration as f64 / query_duration as f64
            } else {
                0.0
            };
            if ratio <= self.config.duration_max_ratio * 1.2 {
                breakdown.add_detail(
                    format!("duration.slightly-too-long:+{delta}s"),
                    self.config.duration_over_ratio_consolation,
                    ScoreFamily::Duration,
                    Some(format!("Exceeds max ratio but not excessively ({ratio:.1}x)")),
                );
            } else {
                breakdown.add_detail(
                    format!("duration.too-long:+{delta}s"),
                    0.0,
                    ScoreFamily::Duration,
                    Some(format!(
                        "Exceeds max ratio ({}x)",
                        self.config.duration_max_ratio
                    )),
                );
            }
        }
    }

    /// Score one candidate against the query
    pub fn score_candidate(&self, query: &RankQuery, candidate: &RankCandidate) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::default();
        let channel = candidate.channel.as_deref().unwrap_or("");
        let query_duration = query.duration_sec.unwrap_or(0);
        let candidate_duration = candidate.duration_sec.unwrap_or(0);

        let working_title = normalize_text(&candidate.title);
        let working_title =
            self.score_artist(&query.artists, channel, working_title, &mut breakdown);
        let artist_score = breakdown.components.artist;

        let (working_title, _matched) =
            self.score_title(&query.title, &working_title, &mut breakdown);
        let title_score = breakdown.components.title;

        // The extended gate needs the remaining penalty, which in turn
        // excludes extended keyword tokens, so detect first, gate, then
        // commit the remaining-token details.
        let detected_tokens: HashSet<String> = self
            .detect_extended_keywords(&working_title)
            .iter()
            .flat_map(|k| tokenize(k))
            .collect();
        let provisional_penalty =
            self.remaining_penalty(&working_title, &detected_tokens, None);

        let extended_tokens = self.score_extended(
            &working_title,
            artist_score,
            title_score,
            provisional_penalty,
            candidate_duration,
            query_duration,
            &mut breakdown,
        );

        self.remaining_penalty(&working_title, &extended_tokens, Some(&mut breakdown));

        self.score_duration(query_duration, candidate_duration, &mut breakdown);

        breakdown
    }

    /// Score and order all candidates.
    ///
    /// A second pass awards an implicit extended bonus to unlabeled
    /// candidates whose duration sits next to a labeled extended version.
    /// Sort is stable: equal totals keep the input order.
    pub fn rank_candidates(
        &self,
        query: &RankQuery,
        candidates: Vec<RankCandidate>,
    ) -> Vec<RankedCandidate> {
        let mut scored: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let breakdown = self.score_candidate(query, &candidate);
                RankedCandidate { candidate, breakdown }
            })
            .collect();

        let query_duration = query.duration_sec.unwrap_or(0);
        let explicit_durations: Vec<i64> = scored
            .iter()
            .filter(|r| !self.detect_extended_keywords(&r.candidate.title).is_empty())
            .filter_map(|r| r.candidate.duration_sec)
            .collect();

        if !explicit_durations.is_empty() {
            for ranked in scored.iter_mut() {
                if !self.detect_extended_keywords(&ranked.candidate.title).is_empty() {
                    continue;
                }
                let Some(duration) = ranked.candidate.duration_sec else { continue };
                let quality_ok = ranked.breakdown.components.artist
                    >= self.config.extended_min_artist_score
                    && ranked.breakdown.components.title >= self.config.extended_min_title_score;
                if !quality_ok {
                    continue;
                }
                let near_explicit = explicit_durations
                    .iter()
                    .any(|d| (duration - d).abs() <= self.config.implicit_extended_window_sec);
                let long_enough = query_duration > 0
                    && (duration as f64)
                        > (query_duration as f64) * self.config.extended_duration_factor;
                if near_explicit && long_enough {
                    ranked.breakdown.add_detail(
                        "extended.implicit".to_string(),
                        self.config.extended_large_bonus * 0.5,
                        ScoreFamily::Extended,
                        Some("Unlabeled version with duration matching a labeled extended cut".to_string()),
                    );
                }
            }
        }

        scored.sort_by(|a, b| {
            b.total()
                .partial_cmp(&a.total())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(artists: &str, title: &str, duration_ms: i64) -> RankQuery {
        RankQuery {
            artists: artists.to_string(),
            title: title.to_string(),
            duration_sec: Some(duration_ms / 1000),
        }
    }

    fn candidate(title: &str, channel: &str, duration_sec: i64) -> RankCandidate {
        RankCandidate {
            external_id: "c1".to_string(),
            url: "https://youtu.be/c1".to_string(),
            title: title.to_string(),
            channel: Some(channel.to_string()),
            duration_sec: Some(duration_sec),
        }
    }

    #[test]
    fn perfect_match_scores_artist_and_exact_title() {
        let service = RankingService::default();
        let q = query("Block & Crown", "Lonely Heart", 240_000);
        let c = candidate("Block & Crown - Lonely Heart", "Block & Crown - Topic", 240);

        let breakdown = service.score_candidate(&q, &c);
        assert_eq!(breakdown.components.artist, 50.0);
        assert_eq!(breakdown.components.title, 100.0);
        assert_eq!(breakdown.components.extended, 0.0);
        assert_eq!(breakdown.components.duration, 0.0);
        assert_eq!(breakdown.total, 150.0);
    }

    #[test]
    fn extended_bonus_applied_when_quality_gates_hold() {
        let service = RankingService::default();
        let q = query("AUSMAX", "Love", 159_000);
        let c = candidate("AUSMAX - Love (Extended Mix)", "FOXsound Official", 324);

        let breakdown = service.score_candidate(&q, &c);
        assert_eq!(breakdown.components.artist, 50.0);
        // quality gates held, so the large bonus plus the length bonus apply
        assert!(breakdown
            .details
            .iter()
            .any(|d| d.key.starts_with("extended.detected")));
        assert_eq!(
            breakdown.components.extended,
            service.config.extended_large_bonus + service.config.extended_duration_bonus
        );
        // the "extended" keyword token is exempt from the remaining penalty
        assert!(!breakdown
            .details
            .iter()
            .any(|d| d.key == "title.remaining-token:extended"));
        assert!(breakdown.total > 150.0);
    }

    #[test]
    fn wrong_artist_is_demoted_below_the_perfect_match() {
        let service = RankingService::default();
        let q = query("Block & Crown", "Lonely Heart", 240_000);
        let perfect = candidate("Block & Crown - Lonely Heart", "Block & Crown - Topic", 240);
        let wrong = candidate("Other Artist - Lonely Heart", "Other Artist", 240);

        let perfect_score = service.score_candidate(&q, &perfect);
        let wrong_score = service.score_candidate(&q, &wrong);

        assert_eq!(
            wrong_score.components.artist,
            service.config.artist_penalty_per_miss
        );
        assert!(wrong_score.total < perfect_score.total);
    }

    #[test]
    fn too_short_candidate_takes_the_large_penalty() {
        let service = RankingService::default();
        let q = query("Block & Crown", "Lonely Heart", 240_000);
        let short = candidate("Block & Crown - Lonely Heart", "Block & Crown - Topic", 120);

        let breakdown = service.score_candidate(&q, &short);
        assert_eq!(breakdown.components.duration, -100.0);
        assert!(breakdown.total < 150.0);
    }

    #[test]
    fn duration_boundaries() {
        let service = RankingService::default();
        let q = query("Artist", "Song", 120_000);

        // equal duration contributes exactly zero
        let equal = service.score_candidate(&q, &candidate("Artist - Song", "Artist", 120));
        assert_eq!(equal.components.duration, 0.0);

        // at exactly max_ratio x reference the bonus is capped at max_bonus
        let at_ratio = service.score_candidate(&q, &candidate("Artist - Song", "Artist", 240));
        assert_eq!(at_ratio.components.duration, service.config.duration_max_bonus);

        // just above the ratio only the consolation applies
        let above = service.score_candidate(&q, &candidate("Artist - Song", "Artist", 250));
        assert_eq!(
            above.components.duration,
            service.config.duration_over_ratio_consolation
        );

        // far beyond, nothing
        let far = service.score_candidate(&q, &candidate("Artist - Song", "Artist", 600));
        assert_eq!(far.components.duration, 0.0);
    }

    #[test]
    fn remaining_token_penalty_is_floored() {
        let service = RankingService::default();
        let q = query("Artist", "Song", 0);
        let noisy = candidate(
            "Artist - Song one two three four five six seven eight nine",
            "Artist",
            0,
        );
        let breakdown = service.score_candidate(&q, &noisy);
        let remaining: f64 = breakdown
            .details
            .iter()
            .filter(|d| d.key.starts_with("title.remaining"))
            .map(|d| d.value)
            .sum();
        assert_eq!(remaining, service.config.title_remaining_token_penalty_max);
    }

    #[test]
    fn ranking_is_deterministic_and_stable() {
        let service = RankingService::default();
        let q = query("Artist", "Song", 180_000);
        let candidates = vec![
            candidate("Artist - Song", "Artist", 180),
            candidate("Artist - Song", "Artist", 180),
            candidate("Unrelated upload", "Someone", 60),
        ];

        let first = service.rank_candidates(&q, candidates.clone());
        let second = service.rank_candidates(&q, candidates);

        let totals: Vec<f64> = first.iter().map(|r| r.total()).collect();
        assert_eq!(totals, second.iter().map(|r| r.total()).collect::<Vec<_>>());
        // the two identical candidates tie and keep their input order
        assert_eq!(first[0].candidate.external_id, "c1");
        assert_eq!(first[0].total(), first[1].total());
        assert!(first[2].total() < first[0].total());
    }

    #[test]
    fn implicit_extended_bonus_for_unlabeled_long_version() {
        let service = RankingService::default();
        let q = query("Artist", "Song", 180_000);
        let labeled = candidate("Artist - Song (Extended Mix)", "Artist", 320);
        let unlabeled = candidate("Artist - Song", "Artist", 310);

        let ranked = service.rank_candidates(&q, vec![labeled, unlabeled]);
        let unlabeled_ranked = ranked
            .iter()
            .find(|r| !r.candidate.title.contains("Extended"))
            .unwrap();
        assert!(unlabeled_ranked
            .breakdown
            .details
            .iter()
            .any(|d| d.key == "extended.implicit"));
        // the labeled cut still wins
        assert!(ranked[0].candidate.title.contains("Extended"));
    }

    #[test]
    fn fuzzy_artist_match_earns_reduced_bonus() {
        let service = RankingService::default();
        let q = RankQuery {
            artists: "Marten Hørger".to_string(),
            title: "Bass".to_string(),
            duration_sec: Some(180),
        };
        let c = candidate("Marten Horger - Bass", "Some Channel", 180);
        let breakdown = service.score_candidate(&q, &c);
        assert_eq!(
            breakdown.components.artist,
            service.config.artist_bonus_per_fuzzy_match
        );
    }

    #[test]
    fn breakdown_serializes_rounded() {
        let service = RankingService::default();
        let q = query("Artist", "Song", 181_000);
        let breakdown = service.score_candidate(&q, &candidate("Artist - Song", "Artist", 182));
        let value = breakdown.to_value();
        assert!(value["total"].is_number());
        assert!(value["details"].as_array().map(|a| !a.is_empty()).unwrap_or(false));
    }
}
