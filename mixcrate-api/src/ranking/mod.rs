//! Candidate ranking engine
//!
//! Scores video-platform search results against a reference
//! `(artists, title, duration)` query. Four independent score families
//! (artist, title, extended-version, duration) sum into the total; every
//! applied rule contributes one entry to a transparent breakdown that
//! consumers display verbatim.
//!
//! Matching consumes a mutable working copy of the candidate title so the
//! same words are never counted twice. The final order is a stable sort:
//! equal totals preserve the input order.

mod config;
mod service;

pub use config::RankingConfig;
pub use service::{
    RankCandidate, RankQuery, RankedCandidate, RankingService, ScoreBreakdown, ScoreDetail,
    ScoreFamily,
};
