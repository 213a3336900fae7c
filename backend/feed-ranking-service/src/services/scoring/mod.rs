//! Feed Scoring Module
//!
//! score = affinity + freshness + popularity
//!
//! - affinity: `affinity_bonus` when the viewer follows the author
//! - freshness: `freshness_scale / (hours_elapsed + 1)^freshness_exponent`
//! - popularity: `likes * like_weight + comments * comment_weight`
//!
//! Every component is finite and non-negative. Posts dated in the future
//! count as zero hours old.

use crate::config::ScoringConfig;
use crate::models::{CandidatePost, FollowSet, ScoreBreakdown, ScoredPost};
use chrono::{DateTime, Utc};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn affinity(&self, post: &CandidatePost, follows: &FollowSet) -> f64 {
        let followed = post.author_id.as_deref().is_some_and(|author| {
            follows.viewer_id() != Some(author) && follows.contains(author)
        });

        if followed {
            self.config.affinity_bonus
        } else {
            0.0
        }
    }

    pub fn freshness(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let hours = hours_elapsed(created_at, now);
        let decay = (hours + 1.0).powf(self.config.freshness_exponent);
        finite_or_zero(self.config.freshness_scale / decay)
    }

    pub fn popularity(&self, like_count: u64, comment_count: u64) -> f64 {
        finite_or_zero(
            like_count as f64 * self.config.like_weight
                + comment_count as f64 * self.config.comment_weight,
        )
    }

    pub fn breakdown(
        &self,
        post: &CandidatePost,
        follows: &FollowSet,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        ScoreBreakdown {
            affinity_score: self.affinity(post, follows),
            freshness_score: self.freshness(post.created_at, now),
            popularity_score: self.popularity(post.like_count, post.comment_count),
        }
    }

    /// Produce a scored copy of `post`; the input is left untouched.
    pub fn score(
        &self,
        post: &CandidatePost,
        follows: &FollowSet,
        now: DateTime<Utc>,
    ) -> ScoredPost {
        let breakdown = self.breakdown(post, follows, now);
        ScoredPost {
            post: post.clone(),
            score: breakdown.total(),
            breakdown,
        }
    }
}

/// Hours between `created_at` and `now`, clamped at zero.
pub fn hours_elapsed(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds();
    (millis as f64 / MILLIS_PER_HOUR).max(0.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
