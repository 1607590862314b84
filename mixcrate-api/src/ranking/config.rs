//! Ranking algorithm tuning parameters
//!
//! Every bonus, penalty and threshold the scorer applies lives here; the
//! algorithm code never embeds a constant.

/// Configuration for the candidate ranking algorithm
#[derive(Debug, Clone)]
pub struct RankingConfig {
    // Artist score
    pub artist_bonus_per_match: f64,
    /// Lower bonus for an accent-folded match (e.g. "Horger" vs "Hørger")
    pub artist_bonus_per_fuzzy_match: f64,
    pub artist_penalty_per_miss: f64,

    // Title score
    pub title_exact_match_bonus: f64,
    pub title_token_bonus_per_match: f64,
    pub title_token_penalty_per_miss: f64,
    pub title_remaining_token_penalty: f64,
    /// Signed floor on the aggregate remaining-token contribution
    pub title_remaining_token_penalty_max: f64,

    // Extended (version) score
    pub extended_keywords: &'static [&'static str],
    pub extended_large_bonus: f64,
    pub extended_max_remaining_penalty_allowed: f64,
    pub extended_min_artist_score: f64,
    pub extended_min_title_score: f64,
    /// Extra bonus when the extended candidate is appropriately long
    pub extended_duration_bonus: f64,
    /// Candidate must exceed query duration by this factor for the
    /// length-based extended bonuses
    pub extended_duration_factor: f64,
    /// Unlabeled candidates within this many seconds of a labeled extended
    /// version earn half the large bonus
    pub implicit_extended_window_sec: i64,

    // Duration score
    pub duration_penalty_too_short: f64,
    pub duration_max_ratio: f64,
    pub duration_min_bonus: f64,
    pub duration_max_bonus: f64,
    pub duration_bonus_per_second: f64,
    /// Consolation bonus for candidates between the max ratio and 1.2x it
    pub duration_over_ratio_consolation: f64,

    /// Channel suffixes stripped before artist comparison
    pub official_channel_suffixes: &'static [&'static str],
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            artist_bonus_per_match: 50.0,
            artist_bonus_per_fuzzy_match: 35.0,
            artist_penalty_per_miss: -15.0,
            title_exact_match_bonus: 100.0,
            title_token_bonus_per_match: 15.0,
            title_token_penalty_per_miss: -10.0,
            title_remaining_token_penalty: -5.0,
            title_remaining_token_penalty_max: -30.0,
            extended_keywords: &["extended", "club", "original mix"],
            extended_large_bonus: 55.0,
            extended_max_remaining_penalty_allowed: 25.0,
            extended_min_artist_score: 30.0,
            extended_min_title_score: 70.0,
            extended_duration_bonus: 10.0,
            extended_duration_factor: 1.3,
            implicit_extended_window_sec: 20,
            duration_penalty_too_short: -100.0,
            duration_max_ratio: 2.0,
            duration_min_bonus: 0.0,
            duration_max_bonus: 30.0,
            duration_bonus_per_second: 0.5,
            duration_over_ratio_consolation: 5.0,
            official_channel_suffixes: &[
                " - topic",
                " - official",
                "vevo",
                " official",
                " - audio",
                " music",
            ],
        }
    }
}
