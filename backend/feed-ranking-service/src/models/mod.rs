use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Post row as returned by the storage collaborator.
///
/// Field shapes are not trusted: ids may be strings or numbers, counts may be
/// scalars or `[{"count": n}]` aggregates, tags may be arrays or encoded strings.
/// `services::normalizer` turns this into a [`CandidatePost`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPostRow {
    #[serde(default)]
    pub id: Value,
    #[serde(default, alias = "author_id", alias = "authorId", alias = "userId")]
    pub user_id: Value,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "body")]
    pub content: Option<String>,
    #[serde(default, alias = "imageUrl", alias = "image")]
    pub image_url: Option<String>,
    #[serde(default, alias = "tagList", alias = "tag_list")]
    pub tags: Value,
    #[serde(default, alias = "createdAt")]
    pub created_at: Value,
    #[serde(default, alias = "likeCount", alias = "likes")]
    pub like_count: Value,
    #[serde(default, alias = "commentCount", alias = "comments")]
    pub comment_count: Value,
    /// Embedded author relation (`users ( name )`).
    #[serde(default, alias = "author")]
    pub users: Option<RawAuthor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAuthor {
    #[serde(default)]
    pub name: Option<String>,
}

/// Canonical post record the engine scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePost {
    pub id: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub title: String,
    pub body: String,
    pub tag_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub comment_count: u64,
    pub has_image: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub affinity_score: f64,
    pub freshness_score: f64,
    pub popularity_score: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.affinity_score + self.freshness_score + self.popularity_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredPost {
    #[serde(flatten)]
    pub post: CandidatePost,
    pub score: f64,
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
}

impl ScoredPost {
    pub fn id(&self) -> &str {
        &self.post.id
    }

    /// Markup-free preview of the body, cut at `max_chars` with an ellipsis.
    pub fn excerpt(&self, max_chars: usize) -> String {
        crate::utils::excerpt(&self.post.body, max_chars)
    }
}

/// Authors a viewer follows. The viewer's own id is never a member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FollowSet {
    viewer_id: Option<String>,
    authors: HashSet<String>,
}

impl FollowSet {
    pub fn new<I, S>(viewer_id: Option<&str>, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            viewer_id: viewer_id.map(str::to_string),
            authors: HashSet::new(),
        };
        for author in authors {
            set.insert(author.into());
        }
        set
    }

    /// Follow set of an anonymous viewer.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    pub fn contains(&self, author_id: &str) -> bool {
        self.authors.contains(author_id)
    }

    /// Returns false when `author_id` is the viewer or already present.
    pub fn insert(&mut self, author_id: String) -> bool {
        if author_id.is_empty() || self.viewer_id.as_deref() == Some(author_id.as_str()) {
            return false;
        }
        self.authors.insert(author_id)
    }

    pub fn remove(&mut self, author_id: &str) -> bool {
        self.authors.remove(author_id)
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

/// Offset/limit window requested from the storage collaborator, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<ScoredPost>,
    /// Offset of the first row of this page in the source ordering.
    pub offset: usize,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Set when the upstream fetch failed and the page is empty for that reason.
    pub retryable: bool,
}

impl FeedPage {
    pub fn failed(offset: usize) -> Self {
        Self {
            posts: Vec::new(),
            offset,
            next_cursor: None,
            has_more: true,
            retryable: true,
        }
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Row change pushed by the caller when fresh data arrives.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Upserted(RawPostRow),
    Removed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_follow_set_excludes_viewer() {
        let follows = FollowSet::new(Some("me"), ["alice", "me", "bob"]);
        assert_eq!(follows.len(), 2);
        assert!(follows.contains("alice"));
        assert!(!follows.contains("me"));
    }

    #[test]
    fn test_follow_set_insert_remove() {
        let mut follows = FollowSet::new(Some("me"), Vec::<String>::new());
        assert!(follows.is_empty());
        assert!(follows.insert("carol".to_string()));
        assert!(!follows.insert("carol".to_string()));
        assert!(!follows.insert("me".to_string()));
        assert!(!follows.insert(String::new()));
        assert!(follows.remove("carol"));
        assert!(follows.is_empty());
    }

    #[test]
    fn test_raw_row_accepts_aliases() {
        let row: RawPostRow = serde_json::from_value(json!({
            "id": 7,
            "authorId": "u1",
            "body": "<p>hi</p>",
            "tagList": ["a"],
            "createdAt": "2024-01-01T00:00:00Z",
            "likes": [{ "count": 3 }],
            "author": { "name": "Ada" }
        }))
        .unwrap();

        assert_eq!(row.id, json!(7));
        assert_eq!(row.user_id, json!("u1"));
        assert_eq!(row.content.as_deref(), Some("<p>hi</p>"));
        assert_eq!(row.like_count, json!([{ "count": 3 }]));
        assert_eq!(row.comment_count, Value::Null);
        assert_eq!(row.users.unwrap().name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_score_breakdown_total() {
        let breakdown = ScoreBreakdown {
            affinity_score: 50.0,
            freshness_score: 10.0,
            popularity_score: 4.0,
        };
        assert_eq!(breakdown.total(), 64.0);
    }

    #[test]
    fn test_failed_page_is_retryable() {
        let page = FeedPage::failed(20);
        assert!(page.is_empty());
        assert!(page.retryable);
        assert_eq!(page.offset, 20);
    }
}
