//! Feed Ranking Metrics
//!
//! Prometheus metrics for page assembly, registered in the default registry

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::time::Duration;

static PAGES_SERVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_pages_served_total",
        "Feed pages returned to callers",
        &["mode", "status"]
    )
    .expect("Failed to register feed pages served metric")
});

static FETCH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fetch_failures_total",
        "Collaborator calls that failed or timed out",
        &["collaborator", "reason"]
    )
    .expect("Failed to register feed fetch failures metric")
});

static STALE_RESPONSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_stale_responses_total",
        "Page responses discarded because the session was reset while in flight"
    )
    .expect("Failed to register feed stale responses metric")
});

static ROWS_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_rows_dropped_total",
        "Raw rows dropped during normalization (missing id or duplicate)"
    )
    .expect("Failed to register feed rows dropped metric")
});

static RANK_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_rank_duration_seconds",
        "Time spent normalizing, scoring and ordering one window",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]
    )
    .expect("Failed to register feed rank duration metric")
});

/// Record a served page (mode: session/stateless, status: ok/failed)
pub fn record_page_served(mode: &str, status: &str) {
    PAGES_SERVED_TOTAL.with_label_values(&[mode, status]).inc();
}

/// Record a collaborator failure (collaborator: posts/follows, reason: error/timeout)
pub fn record_fetch_failure(collaborator: &str, reason: &str) {
    FETCH_FAILURES_TOTAL
        .with_label_values(&[collaborator, reason])
        .inc();
}

pub fn record_stale_response() {
    STALE_RESPONSES_TOTAL.inc();
}

pub fn record_rows_dropped(count: usize) {
    if count > 0 {
        ROWS_DROPPED_TOTAL.inc_by(count as u64);
    }
}

pub fn record_rank_duration(duration: Duration) {
    RANK_DURATION_SECONDS.observe(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = STALE_RESPONSES_TOTAL.get();
        record_stale_response();
        assert!(STALE_RESPONSES_TOTAL.get() > before);

        let before = PAGES_SERVED_TOTAL
            .with_label_values(&["stateless", "ok"])
            .get();
        record_page_served("stateless", "ok");
        assert!(
            PAGES_SERVED_TOTAL
                .with_label_values(&["stateless", "ok"])
                .get()
                > before
        );
    }

    #[test]
    fn test_rows_dropped_ignores_zero() {
        let before = ROWS_DROPPED_TOTAL.get();
        record_rows_dropped(0);
        record_rows_dropped(2);
        assert!(ROWS_DROPPED_TOTAL.get() >= before + 2);
    }
}
