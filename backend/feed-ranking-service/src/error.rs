use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Post source failed: {0}")]
    PostSource(String),

    #[error("Follow graph failed: {0}")]
    FollowGraph(String),

    #[error("Collaborator call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FeedError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::PostSource(_) | FeedError::FollowGraph(_) | FeedError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
