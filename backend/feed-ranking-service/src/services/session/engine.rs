use super::{rank_window, FeedSession, PageOutcome};
use crate::config::{Config, PaginationConfig};
use crate::error::{FeedError, Result};
use crate::metrics;
use crate::models::{FeedPage, FetchWindow, FollowSet, RawPostRow};
use crate::services::filter::FeedFilter;
use crate::services::normalizer::Normalizer;
use crate::services::pagination::{FeedCursor, PageSpec, PageTicket};
use crate::services::ranking::FeedRanker;
use crate::services::scoring::Scorer;
use crate::services::sources::{FollowGraph, PostSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Rows of one window plus the viewer's follow set. `follows` is `None`
/// when the follow graph could not be read.
#[derive(Debug, Clone)]
pub struct FetchedWindow {
    pub rows: Vec<RawPostRow>,
    pub follows: Option<FollowSet>,
}

#[derive(Debug)]
pub struct PageResponse {
    pub ticket: PageTicket,
    pub result: Result<FetchedWindow>,
}

/// Claimed ticket that is handed back to the session if it is dropped
/// before its response lands.
struct PendingPage<'a> {
    session: &'a mut FeedSession,
    ticket: Option<PageTicket>,
}

impl PendingPage<'_> {
    fn finish(mut self, response: PageResponse, now: DateTime<Utc>) -> PageOutcome {
        self.ticket = None;
        self.session.apply(response, now)
    }
}

impl Drop for PendingPage<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.session.abandon(&ticket);
        }
    }
}

/// Ties the collaborators to normalization, ranking and pagination.
pub struct FeedEngine {
    posts: Arc<dyn PostSource>,
    follow_graph: Arc<dyn FollowGraph>,
    normalizer: Normalizer,
    ranker: FeedRanker,
    pagination: PaginationConfig,
    fetch_timeout: Duration,
}

impl FeedEngine {
    pub fn new(
        config: &Config,
        posts: Arc<dyn PostSource>,
        follow_graph: Arc<dyn FollowGraph>,
    ) -> Self {
        Self {
            posts,
            follow_graph,
            normalizer: Normalizer::new(config.pagination.max_tags),
            ranker: FeedRanker::new(Scorer::new(config.scoring)),
            pagination: config.pagination,
            fetch_timeout: config.fetch.timeout(),
        }
    }

    pub fn ranker(&self) -> &FeedRanker {
        &self.ranker
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Page shape for a requested size, falling back to the configured default.
    pub fn page_spec(&self, page_size: Option<usize>) -> PageSpec {
        let size = self
            .pagination
            .clamp_page_size(page_size.unwrap_or(self.pagination.page_size));
        PageSpec::new(size, self.pagination.lookahead)
    }

    pub fn session(&self, viewer_id: Option<&str>, filter: FeedFilter) -> FeedSession {
        FeedSession::new(
            viewer_id,
            filter,
            self.page_spec(None),
            self.normalizer,
            self.ranker,
        )
    }

    /// Authors followed by the viewer. Anonymous viewers follow nobody and
    /// never reach the follow graph.
    pub async fn follow_set(&self, viewer_id: Option<&str>) -> Result<FollowSet> {
        let Some(viewer_id) = viewer_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(FollowSet::empty());
        };

        match timeout(self.fetch_timeout, self.follow_graph.following(viewer_id)).await {
            Ok(Ok(authors)) => Ok(FollowSet::new(Some(viewer_id), authors)),
            Ok(Err(e)) => {
                metrics::record_fetch_failure("follows", "error");
                Err(FeedError::FollowGraph(e.to_string()))
            }
            Err(_) => {
                metrics::record_fetch_failure("follows", "timeout");
                Err(FeedError::Timeout(self.fetch_timeout))
            }
        }
    }

    async fn fetch_rows(&self, window: FetchWindow) -> Result<Vec<RawPostRow>> {
        match timeout(self.fetch_timeout, self.posts.fetch_posts(window)).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => {
                metrics::record_fetch_failure("posts", "error");
                Err(FeedError::PostSource(e.to_string()))
            }
            Err(_) => {
                metrics::record_fetch_failure("posts", "timeout");
                Err(FeedError::Timeout(self.fetch_timeout))
            }
        }
    }

    /// Fetch a window and the follow set concurrently. A follow graph
    /// failure only costs the affinity signal; a post source failure fails
    /// the window.
    pub async fn fetch_window(
        &self,
        viewer_id: Option<&str>,
        window: FetchWindow,
    ) -> Result<FetchedWindow> {
        let (follows, rows) = tokio::join!(self.follow_set(viewer_id), self.fetch_rows(window));

        let follows = match follows {
            Ok(follows) => Some(follows),
            Err(e) => {
                warn!(error = %e, "Follow graph unavailable, ranking without affinity");
                None
            }
        };

        let rows = rows?;
        debug!(
            offset = window.offset,
            limit = window.limit,
            rows = rows.len(),
            "Fetched feed window"
        );

        Ok(FetchedWindow { rows, follows })
    }

    pub async fn fetch(&self, session: &FeedSession, ticket: PageTicket) -> PageResponse {
        PageResponse {
            ticket,
            result: self.fetch_window(session.viewer_id(), ticket.window).await,
        }
    }

    /// Load the session's next page. `None` when the request was suppressed
    /// by the in-flight guard or the feed is exhausted.
    ///
    /// Cancel safe: dropping the future before it resolves releases the
    /// in-flight guard, and the next call requests the same window.
    pub async fn next_page(
        &self,
        session: &mut FeedSession,
        now: DateTime<Utc>,
    ) -> Option<PageOutcome> {
        let ticket = session.begin_next_page()?;
        let pending = PendingPage {
            session,
            ticket: Some(ticket),
        };
        let response = self.fetch(&*pending.session, ticket).await;
        Some(pending.finish(response, now))
    }

    /// Reset the session and load its first page again.
    pub async fn refresh(
        &self,
        session: &mut FeedSession,
        now: DateTime<Utc>,
    ) -> Option<PageOutcome> {
        session.reset();
        self.next_page(session, now).await
    }

    /// Stateless page load driven by an opaque cursor. Only a malformed
    /// cursor is an error; a failed fetch comes back as an empty retryable
    /// page whose cursor repeats the request. Stateless loads hold no
    /// generation of their own, so the cursor's generation is passed
    /// through and never compared.
    pub async fn load_page(
        &self,
        viewer_id: Option<&str>,
        filter: &FeedFilter,
        cursor: Option<&str>,
        page_size: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<FeedPage> {
        let cursor = FeedCursor::decode_optional(cursor)?;
        let spec = self.page_spec(page_size);

        let fetched = match self.fetch_window(viewer_id, spec.window(cursor.offset)).await {
            Ok(fetched) => fetched,
            Err(e) => {
                metrics::record_page_served("stateless", "failed");
                warn!(
                    offset = cursor.offset,
                    error = %e,
                    "Feed page fetch failed, serving empty retryable page"
                );
                return Ok(FeedPage {
                    next_cursor: Some(cursor.encode()),
                    ..FeedPage::failed(cursor.offset)
                });
            }
        };

        let follows = fetched.follows.unwrap_or_else(|| {
            FollowSet::new(viewer_id, Vec::<String>::new())
        });
        let window = rank_window(
            &self.normalizer,
            &self.ranker,
            spec,
            fetched.rows,
            &follows,
            now,
        );

        let next_cursor = window.has_more.then(|| {
            FeedCursor::new(cursor.offset + window.consumed, cursor.generation).encode()
        });
        metrics::record_page_served("stateless", "ok");

        Ok(FeedPage {
            posts: filter.apply(window.posts),
            offset: cursor.offset,
            next_cursor,
            has_more: window.has_more,
            retryable: false,
        })
    }
}
