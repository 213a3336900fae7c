// ============================================
// Feed Session
// ============================================
//
// Per-viewer browsing state for one feed surface:
// - Loaded posts (ranked per window, globally after `rerank`)
// - Cursor, exhaustion flag and in-flight guard (see `Paginator`)
// - Cached follow set used for affinity
//
// Fetching is split in two so the session never has to be borrowed across
// I/O: `begin_next_page` hands out a ticket, the engine fetches it, and
// `apply` lands the response. A response that is not for the request in
// flight (the filter changed or the session was reset meanwhile, or it was
// already applied) is dropped as `PageOutcome::Stale`. A caller that gives up on a
// ticket hands it back with `abandon`.

mod engine;

pub use engine::{FeedEngine, FetchedWindow, PageResponse};

use crate::metrics;
use crate::models::{ChangeEvent, FeedPage, FollowSet, RawPostRow, ScoredPost};
use crate::services::filter::FeedFilter;
use crate::services::normalizer::Normalizer;
use crate::services::pagination::{slice_page, FeedCursor, PageSpec, PageTicket, Paginator};
use crate::services::ranking::FeedRanker;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of landing a page response on a session.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Posts were appended; the page holds the visible (filtered) subset.
    Applied(FeedPage),
    /// The fetch failed. Nothing was appended and the same window is
    /// requested again on the next call.
    Failed(FeedPage),
    /// The session moved on while the request was in flight.
    Stale,
}

impl PageOutcome {
    pub fn page(&self) -> Option<&FeedPage> {
        match self {
            PageOutcome::Applied(page) | PageOutcome::Failed(page) => Some(page),
            PageOutcome::Stale => None,
        }
    }

    pub fn into_page(self) -> Option<FeedPage> {
        match self {
            PageOutcome::Applied(page) | PageOutcome::Failed(page) => Some(page),
            PageOutcome::Stale => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, PageOutcome::Applied(_))
    }
}

#[derive(Debug, Clone)]
pub struct FeedSession {
    viewer_id: Option<String>,
    filter: FeedFilter,
    paginator: Paginator,
    normalizer: Normalizer,
    ranker: FeedRanker,
    follows: FollowSet,
    posts: Vec<ScoredPost>,
    loaded_ids: HashSet<String>,
}

impl FeedSession {
    pub fn new(
        viewer_id: Option<&str>,
        filter: FeedFilter,
        spec: PageSpec,
        normalizer: Normalizer,
        ranker: FeedRanker,
    ) -> Self {
        let viewer_id = viewer_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Self {
            follows: FollowSet::new(viewer_id.as_deref(), Vec::<String>::new()),
            viewer_id,
            filter,
            paginator: Paginator::new(spec),
            normalizer,
            ranker,
            posts: Vec::new(),
            loaded_ids: HashSet::new(),
        }
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    pub fn follows(&self) -> &FollowSet {
        &self.follows
    }

    pub fn generation(&self) -> u64 {
        self.paginator.generation()
    }

    pub fn is_loading(&self) -> bool {
        self.paginator.is_loading()
    }

    pub fn is_exhausted(&self) -> bool {
        self.paginator.is_exhausted()
    }

    pub fn cursor(&self) -> FeedCursor {
        self.paginator.cursor()
    }

    /// Every loaded post, ignoring the filter.
    pub fn posts(&self) -> &[ScoredPost] {
        &self.posts
    }

    /// Loaded posts that pass the current filter, in ranked order.
    pub fn visible(&self) -> Vec<ScoredPost> {
        self.filter.apply(self.posts.clone())
    }

    /// A slice of [`visible`](Self::visible) plus whether more follow it.
    pub fn visible_page(&self, offset: usize, page_size: usize) -> (Vec<ScoredPost>, bool) {
        slice_page(&self.visible(), offset, page_size)
    }

    /// Claim the next window. `None` while a request is in flight or once
    /// the source is exhausted.
    pub fn begin_next_page(&mut self) -> Option<PageTicket> {
        let ticket = self.paginator.begin();
        if ticket.is_none() {
            debug!(
                viewer_id = ?self.viewer_id,
                loading = self.paginator.is_loading(),
                exhausted = self.paginator.is_exhausted(),
                "Page request suppressed"
            );
        }
        ticket
    }

    pub fn apply(&mut self, response: PageResponse, now: DateTime<Utc>) -> PageOutcome {
        let PageResponse { ticket, result } = response;

        if !self.paginator.accepts(&ticket) {
            metrics::record_stale_response();
            debug!(
                ticket_generation = ticket.generation,
                current_generation = self.paginator.generation(),
                offset = ticket.window.offset,
                next_offset = self.paginator.next_offset(),
                "Discarding stale page response"
            );
            return PageOutcome::Stale;
        }

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(error) => {
                self.paginator.fail(&ticket);
                metrics::record_page_served("session", "failed");
                warn!(
                    viewer_id = ?self.viewer_id,
                    offset = ticket.window.offset,
                    error = %error,
                    "Feed page fetch failed, serving empty retryable page"
                );
                return PageOutcome::Failed(FeedPage {
                    next_cursor: Some(self.paginator.cursor().encode()),
                    ..FeedPage::failed(ticket.window.offset)
                });
            }
        };

        if let Some(follows) = fetched.follows {
            self.follows = follows;
        }

        let window = rank_window(
            &self.normalizer,
            &self.ranker,
            self.paginator.spec(),
            fetched.rows,
            &self.follows,
            now,
        );
        self.paginator
            .complete(&ticket, window.consumed, window.has_more);

        // Rows can shift between windows when posts are inserted upstream.
        let loaded_ids = &mut self.loaded_ids;
        let fresh: Vec<ScoredPost> = window
            .posts
            .into_iter()
            .filter(|post| loaded_ids.insert(post.post.id.clone()))
            .collect();
        self.posts.extend(fresh.iter().cloned());

        let page = FeedPage {
            posts: self.filter.apply(fresh),
            offset: ticket.window.offset,
            next_cursor: window
                .has_more
                .then(|| self.paginator.cursor().encode()),
            has_more: window.has_more,
            retryable: false,
        };

        metrics::record_page_served("session", "ok");
        info!(
            viewer_id = ?self.viewer_id,
            offset = page.offset,
            visible = page.posts.len(),
            loaded = self.posts.len(),
            has_more = page.has_more,
            "Feed page applied"
        );

        PageOutcome::Applied(page)
    }

    /// Give up on an in-flight request whose response will not be applied,
    /// so the next call can claim the same window again.
    pub fn abandon(&mut self, ticket: &PageTicket) -> bool {
        let released = self.paginator.abandon(ticket);
        if released {
            debug!(
                viewer_id = ?self.viewer_id,
                offset = ticket.window.offset,
                "Page request abandoned"
            );
        }
        released
    }

    /// Replace the filter. A different filter starts over from the first
    /// page; returns false when the filter is unchanged.
    pub fn set_filter(&mut self, filter: FeedFilter) -> bool {
        if filter == self.filter {
            return false;
        }
        debug!(
            category = %filter.category,
            terms = filter.query.terms().len(),
            "Feed filter changed"
        );
        self.filter = filter;
        self.reset();
        true
    }

    /// Drop loaded posts and return to the first page. Responses to requests
    /// issued before the reset come back as stale.
    pub fn reset(&mut self) {
        self.paginator.reset();
        self.posts.clear();
        self.loaded_ids.clear();
        debug!(
            viewer_id = ?self.viewer_id,
            generation = self.paginator.generation(),
            "Feed session reset"
        );
    }

    /// Merge a pushed row change into the loaded posts. Ordering is left
    /// alone until [`rerank`](Self::rerank) is called.
    pub fn apply_change(&mut self, event: ChangeEvent, now: DateTime<Utc>) -> bool {
        match event {
            ChangeEvent::Upserted(row) => self.upsert_row(&row, now),
            ChangeEvent::Removed(post_id) => {
                if !self.loaded_ids.remove(&post_id) {
                    return false;
                }
                self.posts.retain(|post| post.post.id != post_id);
                true
            }
        }
    }

    fn upsert_row(&mut self, row: &RawPostRow, now: DateTime<Utc>) -> bool {
        let Some(candidate) = self.normalizer.normalize_row(row) else {
            return false;
        };
        let scored = self.ranker.scorer().score(&candidate, &self.follows, now);

        match self.posts.iter_mut().find(|post| post.post.id == scored.post.id) {
            Some(existing) => *existing = scored,
            None => {
                self.loaded_ids.insert(scored.post.id.clone());
                self.posts.push(scored);
            }
        }
        true
    }

    pub fn follow(&mut self, author_id: &str) -> bool {
        self.follows.insert(author_id.to_string())
    }

    pub fn unfollow(&mut self, author_id: &str) -> bool {
        self.follows.remove(author_id)
    }

    /// Re-score all loaded posts against the current follow set and `now`,
    /// and order them as one list.
    pub fn rerank(&mut self, now: DateTime<Utc>) {
        let started = Instant::now();
        let posts = std::mem::take(&mut self.posts);
        self.posts = self.ranker.rerank(posts, &self.follows, now);
        metrics::record_rank_duration(started.elapsed());
    }
}

struct RankedWindow {
    posts: Vec<ScoredPost>,
    consumed: usize,
    has_more: bool,
}

/// Trim a fetched window to the page, normalize it and rank it.
fn rank_window(
    normalizer: &Normalizer,
    ranker: &FeedRanker,
    spec: PageSpec,
    rows: Vec<RawPostRow>,
    follows: &FollowSet,
    now: DateTime<Utc>,
) -> RankedWindow {
    let started = Instant::now();

    let slice = spec.settle(rows);
    let candidates = normalizer.normalize_rows(&slice.rows);
    metrics::record_rows_dropped(slice.rows.len().saturating_sub(candidates.len()));

    let posts = ranker.rank_candidates(&candidates, follows, now);
    metrics::record_rank_duration(started.elapsed());

    RankedWindow {
        posts,
        consumed: slice.consumed,
        has_more: slice.has_more,
    }
}
