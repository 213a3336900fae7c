//! Normalizer Module
//!
//! Repairs raw storage rows into canonical [`CandidatePost`] records at the
//! ingress boundary. Missing or malformed fields are defaulted, never raised:
//! counts fall back to 0, timestamps to the Unix epoch, author names to
//! `"Unknown"`. Only rows without a usable id are dropped.

pub mod tags;

pub use tags::{normalize_tag_text, normalize_tags};

use crate::models::{CandidatePost, RawPostRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Epoch values above this are read as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_tags: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Normalizer {
    pub fn new(max_tags: usize) -> Self {
        Self { max_tags }
    }

    pub fn normalize_row(&self, row: &RawPostRow) -> Option<CandidatePost> {
        let Some(id) = value_to_id(&row.id) else {
            warn!(raw_id = %row.id, "Dropping post row without a usable id");
            return None;
        };

        let created_at = parse_timestamp(&row.created_at).unwrap_or_else(|| {
            debug!(post_id = %id, raw = %row.created_at, "Unparseable created_at, using epoch");
            DateTime::<Utc>::default()
        });

        let author_name = row
            .users
            .as_ref()
            .and_then(|author| author.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_AUTHOR)
            .to_string();

        Some(CandidatePost {
            author_id: value_to_id(&row.user_id),
            author_name,
            title: row.title.clone().unwrap_or_default(),
            body: row.content.clone().unwrap_or_default(),
            tag_list: normalize_tags(&row.tags, self.max_tags),
            created_at,
            like_count: coerce_count(&row.like_count),
            comment_count: coerce_count(&row.comment_count),
            has_image: row
                .image_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty()),
            id,
        })
    }

    /// Normalize a batch, keeping the first occurrence of each id.
    pub fn normalize_rows(&self, rows: &[RawPostRow]) -> Vec<CandidatePost> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut posts = Vec::with_capacity(rows.len());

        for row in rows {
            if let Some(post) = self.normalize_row(row) {
                if seen.insert(post.id.clone()) {
                    posts.push(post);
                }
            }
        }

        posts
    }
}

/// Render an id field as an opaque string. Empty strings are not ids.
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a count field to a non-negative integer.
///
/// Accepts numbers, numeric strings and aggregate shapes such as
/// `[{"count": 4}]` or `{"count": 4}`. Anything else is 0.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                v
            } else if let Some(v) = n.as_i64() {
                v.max(0) as u64
            } else {
                n.as_f64().map(float_to_count).unwrap_or(0)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(|v| v.max(0) as u64)
                .or_else(|_| s.parse::<f64>().map(float_to_count))
                .unwrap_or(0)
        }
        Value::Array(items) => items.first().map(coerce_count).unwrap_or(0),
        Value::Object(map) => map.get("count").map(coerce_count).unwrap_or(0),
        Value::Null | Value::Bool(_) => 0,
    }
}

fn float_to_count(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.floor() as u64
    } else {
        0
    }
}

/// Parse RFC 3339, Postgres timestamp text, bare dates, or epoch
/// seconds/milliseconds (numeric or string).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_text(s.trim()),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    text.parse::<i64>().ok().and_then(from_epoch)
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.unsigned_abs() >= MILLIS_THRESHOLD.unsigned_abs() {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}
