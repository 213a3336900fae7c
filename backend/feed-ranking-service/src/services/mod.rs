pub mod filter;
pub mod normalizer;
pub mod pagination;
pub mod ranking;
pub mod scoring;
pub mod session;
pub mod sources;

pub use filter::{CategoryFilter, FeedFilter};
pub use normalizer::Normalizer;
pub use ranking::FeedRanker;
pub use scoring::Scorer;
pub use session::{FeedEngine, FeedSession, PageOutcome};
pub use sources::{FollowGraph, PostSource};
