//! Pagination
//!
//! Pages are offset/limit windows over the storage ordering (newest first).
//! With lookahead the window asks for one extra row and trims it, so
//! `has_more` is exact. Without it a short page is the only exhaustion
//! signal, and a final page of exactly `page_size` rows reports
//! `has_more = true` until the next request comes back empty.
//!
//! Trimming happens on raw rows in source order, before ranking, so the
//! extra row is never shown and is fetched again as the head of the next
//! window.

use crate::error::{FeedError, Result};
use crate::models::FetchWindow;
use base64::{engine::general_purpose, Engine as _};

/// Opaque continuation token handed to stateless callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedCursor {
    pub offset: usize,
    /// Session generation the cursor was minted under. Only sessions
    /// compare it; stateless loads carry it forward unchecked.
    pub generation: u64,
}

impl FeedCursor {
    pub fn new(offset: usize, generation: u64) -> Self {
        Self { offset, generation }
    }

    pub fn encode(&self) -> String {
        let payload = format!("{}:{}", self.generation, self.offset);
        general_purpose::URL_SAFE_NO_PAD.encode(payload)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let decoded = general_purpose::URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| FeedError::InvalidCursor("Invalid cursor format".to_string()))?;
        let payload = String::from_utf8(decoded)
            .map_err(|_| FeedError::InvalidCursor("Invalid cursor encoding".to_string()))?;
        let (generation, offset) = payload
            .split_once(':')
            .ok_or_else(|| FeedError::InvalidCursor("Invalid cursor layout".to_string()))?;

        Ok(Self {
            generation: generation
                .parse()
                .map_err(|_| FeedError::InvalidCursor("Invalid cursor generation".to_string()))?,
            offset: offset
                .parse()
                .map_err(|_| FeedError::InvalidCursor("Invalid cursor offset".to_string()))?,
        })
    }

    /// Decode an optional token; absent or empty means the first page.
    pub fn decode_optional(token: Option<&str>) -> Result<Self> {
        match token {
            Some(token) if !token.trim().is_empty() => Self::decode(token),
            _ => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub page_size: usize,
    pub lookahead: bool,
}

impl PageSpec {
    pub fn new(page_size: usize, lookahead: bool) -> Self {
        Self {
            page_size: page_size.max(1),
            lookahead,
        }
    }

    pub fn window(&self, offset: usize) -> FetchWindow {
        FetchWindow {
            offset,
            limit: self.page_size + usize::from(self.lookahead),
        }
    }

    /// Trim a fetched window to the page and decide `has_more`.
    pub fn settle<T>(&self, mut rows: Vec<T>) -> WindowSlice<T> {
        let has_more = if self.lookahead {
            rows.len() > self.page_size
        } else {
            rows.len() >= self.page_size
        };
        rows.truncate(self.page_size);

        WindowSlice {
            consumed: rows.len(),
            rows,
            has_more,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSlice<T> {
    pub rows: Vec<T>,
    /// Source rows this page accounts for; the next window starts after them.
    pub consumed: usize,
    pub has_more: bool,
}

/// Handle for one in-flight page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    pub generation: u64,
    pub window: FetchWindow,
}

/// Per-session cursor state: next offset, exhaustion, the in-flight guard
/// and the generation that stale responses are checked against.
#[derive(Debug, Clone)]
pub struct Paginator {
    spec: PageSpec,
    next_offset: usize,
    exhausted: bool,
    in_flight: bool,
    generation: u64,
}

impl Paginator {
    pub fn new(spec: PageSpec) -> Self {
        Self {
            spec,
            next_offset: 0,
            exhausted: false,
            in_flight: false,
            generation: 0,
        }
    }

    pub fn spec(&self) -> PageSpec {
        self.spec
    }

    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Start a page request. `None` while a request is in flight or once the
    /// feed is exhausted.
    pub fn begin(&mut self) -> Option<PageTicket> {
        if self.in_flight || self.exhausted {
            return None;
        }
        self.in_flight = true;
        Some(PageTicket {
            generation: self.generation,
            window: self.spec.window(self.next_offset),
        })
    }

    pub fn is_current(&self, ticket: &PageTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Whether `ticket` is the request currently in flight. Tickets from an
    /// older generation, abandoned tickets and replayed responses are not.
    pub fn accepts(&self, ticket: &PageTicket) -> bool {
        self.in_flight && self.is_current(ticket) && ticket.window.offset == self.next_offset
    }

    /// Record a successful response. Returns false, leaving state
    /// untouched, unless the ticket is the one in flight.
    pub fn complete(&mut self, ticket: &PageTicket, consumed: usize, has_more: bool) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.in_flight = false;
        self.next_offset = ticket.window.offset + consumed;
        self.exhausted = !has_more;
        true
    }

    /// Record a failed response; the same window is requested next time.
    pub fn fail(&mut self, ticket: &PageTicket) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.in_flight = false;
        true
    }

    /// Release the guard for a request whose response will never be
    /// applied. The same window is requested next time.
    pub fn abandon(&mut self, ticket: &PageTicket) -> bool {
        self.fail(ticket)
    }

    /// Back to the first page under a new generation.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.next_offset = 0;
        self.exhausted = false;
        self.in_flight = false;
    }

    pub fn cursor(&self) -> FeedCursor {
        FeedCursor::new(self.next_offset, self.generation)
    }
}

/// Slice an in-memory sequence into a page.
pub fn slice_page<T: Clone>(items: &[T], offset: usize, page_size: usize) -> (Vec<T>, bool) {
    let start = offset.min(items.len());
    let end = start.saturating_add(page_size.max(1)).min(items.len());
    (items[start..end].to_vec(), end < items.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = FeedCursor::new(40, 3);
        let token = cursor.encode();
        assert_eq!(FeedCursor::decode(&token).unwrap(), cursor);
        assert_eq!(FeedCursor::decode_optional(Some(&token)).unwrap(), cursor);
    }

    #[test]
    fn test_cursor_absent_means_first_page() {
        assert_eq!(FeedCursor::decode_optional(None).unwrap(), FeedCursor::default());
        assert_eq!(FeedCursor::decode_optional(Some("  ")).unwrap(), FeedCursor::default());
    }

    #[test]
    fn test_invalid_cursor() {
        for token in ["%%%", "bm9jb2xvbg", "YTpi"] {
            let result = FeedCursor::decode(token);
            assert!(
                matches!(result, Err(FeedError::InvalidCursor(_))),
                "token {token} should be rejected"
            );
        }
    }

    #[test]
    fn test_window_with_lookahead() {
        let spec = PageSpec::new(10, true);
        assert_eq!(spec.window(20), FetchWindow { offset: 20, limit: 11 });

        let full = spec.settle((0..11).collect::<Vec<_>>());
        assert_eq!(full.rows.len(), 10);
        assert_eq!(full.consumed, 10);
        assert!(full.has_more);

        let exact = spec.settle((0..10).collect::<Vec<_>>());
        assert_eq!(exact.rows.len(), 10);
        assert!(!exact.has_more);
    }

    #[test]
    fn test_window_without_lookahead_keeps_short_page_signal() {
        let spec = PageSpec::new(10, false);
        assert_eq!(spec.window(0).limit, 10);

        let exact = spec.settle((0..10).collect::<Vec<_>>());
        assert!(exact.has_more);

        let short = spec.settle((0..4).collect::<Vec<_>>());
        assert!(!short.has_more);
        assert_eq!(short.consumed, 4);
    }

    #[test]
    fn test_in_flight_guard() {
        let mut paginator = Paginator::new(PageSpec::new(10, true));
        let ticket = paginator.begin().unwrap();
        assert!(paginator.is_loading());
        assert!(paginator.begin().is_none());

        assert!(paginator.complete(&ticket, 10, true));
        assert!(!paginator.is_loading());
        assert_eq!(paginator.next_offset(), 10);

        let next = paginator.begin().unwrap();
        assert_eq!(next.window.offset, 10);
    }

    #[test]
    fn test_exhaustion_stops_requests() {
        let mut paginator = Paginator::new(PageSpec::new(10, false));
        let ticket = paginator.begin().unwrap();
        assert!(paginator.complete(&ticket, 3, false));

        assert!(paginator.is_exhausted());
        assert!(paginator.begin().is_none());
    }

    #[test]
    fn test_failure_retries_same_window() {
        let mut paginator = Paginator::new(PageSpec::new(5, true));
        let first = paginator.begin().unwrap();
        assert!(paginator.complete(&first, 5, true));

        let second = paginator.begin().unwrap();
        assert!(paginator.fail(&second));
        let retry = paginator.begin().unwrap();
        assert_eq!(retry.window, second.window);
    }

    #[test]
    fn test_reset_discards_stale_ticket() {
        let mut paginator = Paginator::new(PageSpec::new(10, true));
        let stale = paginator.begin().unwrap();
        paginator.reset();

        assert!(!paginator.is_loading());
        assert!(!paginator.complete(&stale, 10, true));
        assert!(!paginator.fail(&stale));
        assert_eq!(paginator.next_offset(), 0);

        let fresh = paginator.begin().unwrap();
        assert_eq!(fresh.generation, stale.generation + 1);
        assert_eq!(fresh.window.offset, 0);
    }

    #[test]
    fn test_replayed_response_does_not_advance_offset() {
        let mut paginator = Paginator::new(PageSpec::new(10, true));
        let ticket = paginator.begin().unwrap();
        assert!(paginator.complete(&ticket, 10, true));

        assert!(!paginator.accepts(&ticket));
        assert!(!paginator.complete(&ticket, 10, true));
        assert!(!paginator.fail(&ticket));
        assert_eq!(paginator.next_offset(), 10);

        let next = paginator.begin().unwrap();
        assert!(!paginator.complete(&ticket, 10, true));
        assert!(paginator.complete(&next, 10, true));
        assert_eq!(paginator.next_offset(), 20);
    }

    #[test]
    fn test_abandon_releases_guard() {
        let mut paginator = Paginator::new(PageSpec::new(5, true));
        let abandoned = paginator.begin().unwrap();
        assert!(paginator.abandon(&abandoned));
        assert!(!paginator.is_loading());
        assert!(!paginator.abandon(&abandoned));

        let retry = paginator.begin().unwrap();
        assert_eq!(retry.window, abandoned.window);
        assert!(paginator.complete(&retry, 5, false));
        assert!(paginator.is_exhausted());
    }

    #[test]
    fn test_slice_page() {
        let items: Vec<u32> = (0..25).collect();
        assert_eq!(slice_page(&items, 0, 10), ((0..10).collect::<Vec<u32>>(), true));
        assert_eq!(slice_page(&items, 20, 10), ((20..25).collect::<Vec<u32>>(), false));
        assert_eq!(slice_page(&items, 30, 10), (vec![], false));
    }
}
