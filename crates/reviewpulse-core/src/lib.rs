// Trending change discovery: fetch, score, cache
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod providers;
pub mod refresh;
pub mod source;
pub mod trending;
pub mod trending_cache;

pub use config::{CacheBackend, Config, Preferences};
pub use error::Error;
pub use models::{Account, Change, ChangeMessage, ReviewerState};
pub use providers::GerritProvider;
pub use refresh::{RefreshPhase, TrendingService};
pub use source::{ChangeSource, TrendingQuery};
pub use trending::{ScoreBreakdown, TrendingScorer};
pub use trending_cache::{CachedResultSet, TrendingCache};

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
