//! Collaborator boundaries: the storage query layer and the follow graph.
//!
//! Implementations live outside the engine (hosted backend clients). The
//! in-memory versions here back tests and local fixtures.

use crate::models::{FetchWindow, RawPostRow};
use crate::services::normalizer::{parse_timestamp, value_to_id};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage query collaborator. Rows come back newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self, window: FetchWindow) -> Result<Vec<RawPostRow>>;
}

/// Follow-graph collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FollowGraph: Send + Sync {
    /// Author ids followed by `viewer_id`.
    async fn following(&self, viewer_id: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPostSource {
    rows: Arc<RwLock<Vec<RawPostRow>>>,
}

impl InMemoryPostSource {
    pub fn new(rows: Vec<RawPostRow>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    /// Insert a row, replacing any row with the same id.
    pub async fn upsert(&self, row: RawPostRow) {
        let mut rows = self.rows.write().await;
        let id = value_to_id(&row.id);
        match rows.iter_mut().find(|r| id.is_some() && value_to_id(&r.id) == id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    pub async fn remove(&self, post_id: &str) -> bool {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| value_to_id(&r.id).as_deref() != Some(post_id));
        rows.len() != before
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl PostSource for InMemoryPostSource {
    async fn fetch_posts(&self, window: FetchWindow) -> Result<Vec<RawPostRow>> {
        let rows = self.rows.read().await;

        let mut ordered: Vec<(DateTime<Utc>, &RawPostRow)> = rows
            .iter()
            .map(|row| (parse_timestamp(&row.created_at).unwrap_or_default(), row))
            .collect();
        // Stable sort: rows with equal timestamps keep insertion order
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(ordered
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryFollowGraph {
    edges: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemoryFollowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn follow(&self, viewer_id: &str, author_id: &str) {
        self.edges
            .write()
            .await
            .entry(viewer_id.to_string())
            .or_default()
            .insert(author_id.to_string());
    }

    pub async fn unfollow(&self, viewer_id: &str, author_id: &str) {
        if let Some(authors) = self.edges.write().await.get_mut(viewer_id) {
            authors.remove(author_id);
        }
    }
}

#[async_trait]
impl FollowGraph for InMemoryFollowGraph {
    async fn following(&self, viewer_id: &str) -> Result<Vec<String>> {
        let edges = self.edges.read().await;
        let mut authors: Vec<String> = edges
            .get(viewer_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        authors.sort();
        Ok(authors)
    }
}
