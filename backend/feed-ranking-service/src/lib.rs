pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{FeedError, Result};
pub use models::{CandidatePost, ChangeEvent, FeedPage, FollowSet, RawPostRow, ScoredPost};
pub use services::{
    CategoryFilter, FeedEngine, FeedFilter, FeedRanker, FeedSession, FollowGraph, Normalizer,
    PageOutcome, PostSource, Scorer,
};
