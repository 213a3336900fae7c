//! Ranking Module
//!
//! Scores candidates and orders them by score descending. Equal scores are
//! ordered by `created_at` descending, then by `id` ascending, so the output
//! never depends on the order rows arrived in.

use crate::models::{CandidatePost, FollowSet, ScoredPost};
use crate::services::scoring::Scorer;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRanker {
    scorer: Scorer,
}

impl FeedRanker {
    pub fn new(scorer: Scorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Score every candidate against `follows` and return them ranked.
    pub fn rank_candidates(
        &self,
        candidates: &[CandidatePost],
        follows: &FollowSet,
        now: DateTime<Utc>,
    ) -> Vec<ScoredPost> {
        let mut ranked: Vec<ScoredPost> = candidates
            .iter()
            .map(|post| self.scorer.score(post, follows, now))
            .collect();

        sort_ranked(&mut ranked);

        debug!(
            candidate_count = ranked.len(),
            followed_authors = follows.len(),
            top_score = ranked.first().map(|p| p.score),
            "Ranking complete"
        );

        ranked
    }

    /// Re-score already ranked posts, e.g. after the follow set or a
    /// post's counters changed.
    pub fn rerank(
        &self,
        posts: Vec<ScoredPost>,
        follows: &FollowSet,
        now: DateTime<Utc>,
    ) -> Vec<ScoredPost> {
        let candidates: Vec<CandidatePost> = posts.into_iter().map(|p| p.post).collect();
        self.rank_candidates(&candidates, follows, now)
    }
}

pub fn sort_ranked(posts: &mut [ScoredPost]) {
    posts.sort_by(compare_ranked);
}

/// Total order used by the feed: score desc, created_at desc, id asc.
pub fn compare_ranked(a: &ScoredPost, b: &ScoredPost) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.post.created_at.cmp(&a.post.created_at))
        .then_with(|| a.post.id.cmp(&b.post.id))
}
