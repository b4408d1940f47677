// Persisted trending result sets, one per account
use chrono::{DateTime, Utc};
use reviewpulse_cache::CacheStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{models::Change, Result};

/// Key the trending set is stored under for every account
pub const TRENDING_CACHE_KEY: &str = "trending_changes";

/// Cached sets older than this are recomputed
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// The last computed trending list, scores included
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedResultSet {
    pub computed_at: DateTime<Utc>,
    pub changes: Vec<Change>,
}

/// Staleness-aware wrapper around a [`CacheStore`]
#[derive(Clone)]
pub struct TrendingCache {
    store: Arc<dyn CacheStore>,
    max_age: Duration,
}

impl TrendingCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_max_age(store, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(store: Arc<dyn CacheStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// The cached set, if present, younger than `max_age` and readable
    ///
    /// Every failure along the way is logged and reported as a miss.
    pub fn load(&self, account: &str) -> Option<CachedResultSet> {
        let age = match self.store.age(account, TRENDING_CACHE_KEY) {
            Ok(Some(age)) => age,
            Ok(None) => {
                debug!("No trending cache for {}", account);
                return None;
            }
            Err(e) => {
                warn!("Could not stat trending cache for {}: {}", account, e);
                return None;
            }
        };

        if age >= self.max_age {
            debug!(
                "Trending cache for {} is stale ({}s old)",
                account,
                age.as_secs()
            );
            return None;
        }

        let bytes = match self.store.read(account, TRENDING_CACHE_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read trending cache for {}: {}", account, e);
                return None;
            }
        };

        match serde_json::from_slice::<CachedResultSet>(&bytes) {
            Ok(set) => {
                debug!(
                    "Trending cache hit for {} ({} changes)",
                    account,
                    set.changes.len()
                );
                Some(set)
            }
            Err(e) => {
                warn!("Discarding corrupt trending cache for {}: {}", account, e);
                None
            }
        }
    }

    /// Overwrite the account's cached set
    pub fn store(&self, account: &str, changes: &[Change]) -> Result<()> {
        let set = CachedResultSet {
            computed_at: Utc::now(),
            changes: changes.to_vec(),
        };
        let bytes = serde_json::to_vec(&set)?;
        self.store.write(account, TRENDING_CACHE_KEY, &bytes)?;
        debug!("Cached {} trending changes for {}", changes.len(), account);
        Ok(())
    }

    /// Forget the account's cached set
    pub fn invalidate(&self, account: &str) -> Result<()> {
        self.store.remove(account, TRENDING_CACHE_KEY)?;
        Ok(())
    }
}
