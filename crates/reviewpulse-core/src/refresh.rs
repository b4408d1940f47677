// Trending list with cache-first refresh cycles
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::Preferences,
    fetcher::fetch_all,
    models::Change,
    source::{ChangeSource, TrendingQuery},
    trending::TrendingScorer,
    trending_cache::TrendingCache,
    Error, Result,
};

/// Where the current refresh cycle is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    CheckingCache,
    Fetching,
    Scoring,
    Ready { changes: usize, from_cache: bool },
    Failed(String),
}

/// Produces the trending list for one account
///
/// A call to [`get_trending_changes`](Self::get_trending_changes) that has to
/// go to the server is a refresh cycle. Starting a cycle supersedes whatever
/// cycle was still running: the older one finishes its network work but
/// neither touches the cache nor reports phases, and resolves to
/// [`Error::Superseded`]. Reads served from a fresh cache are not cycles and
/// never supersede anything.
pub struct TrendingService {
    source: Arc<dyn ChangeSource>,
    cache: TrendingCache,
    scorer: TrendingScorer,
    prefs: Preferences,
    query: TrendingQuery,
    generation: AtomicU64,
    // Held while a cycle checks its generation and writes the cache
    commit: Mutex<()>,
    phase: watch::Sender<RefreshPhase>,
}

impl TrendingService {
    pub fn new(source: Arc<dyn ChangeSource>, cache: TrendingCache, prefs: Preferences) -> Self {
        let (phase, _) = watch::channel(RefreshPhase::Idle);
        Self {
            source,
            cache,
            scorer: TrendingScorer::new(),
            prefs,
            query: TrendingQuery::default(),
            generation: AtomicU64::new(0),
            commit: Mutex::new(()),
            phase,
        }
    }

    pub fn with_query(mut self, query: TrendingQuery) -> Self {
        self.query = query;
        self
    }

    pub fn cache(&self) -> &TrendingCache {
        &self.cache
    }

    /// Follow phase transitions of the current cycle
    pub fn subscribe(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> RefreshPhase {
        self.phase.borrow().clone()
    }

    /// Produce the trending list
    ///
    /// Without `force_refresh` a fresh cached set is returned as is. Otherwise
    /// (or on a miss) a refresh cycle fetches and scores every candidate
    /// change, and the result replaces the cached set. Fetch errors leave the
    /// cache untouched.
    pub async fn get_trending_changes(&self, force_refresh: bool) -> Result<Vec<Change>> {
        let account = self.prefs.account.as_str();

        if force_refresh {
            debug!("Forced refresh for {}, skipping cache", account);
        } else {
            self.publish_cache_phase(RefreshPhase::CheckingCache);
            if let Some(cached) = self.cache.load(account) {
                info!("Serving {} trending changes from cache", cached.changes.len());
                self.publish_cache_phase(RefreshPhase::Ready {
                    changes: cached.changes.len(),
                    from_cache: true,
                });
                return Ok(cached.changes);
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.publish(generation, RefreshPhase::Fetching);
        let candidates = match fetch_all(self.source.as_ref(), &self.query).await {
            Ok(changes) => changes,
            Err(e) => {
                self.ensure_current(generation)?;
                warn!("Trending refresh failed: {}", e);
                self.publish(generation, RefreshPhase::Failed(e.to_string()));
                return Err(e);
            }
        };
        self.ensure_current(generation)?;

        self.publish(generation, RefreshPhase::Scoring);
        let total = candidates.len();
        let trending = self
            .scorer
            .select(candidates, Utc::now(), self.prefs.max_items);
        info!("{} of {} changes are trending", trending.len(), total);

        self.commit(generation, account, &trending)?;
        Ok(trending)
    }

    /// Run a cycle on the runtime's worker threads
    pub fn spawn_cycle(self: &Arc<Self>, force_refresh: bool) -> JoinHandle<Result<Vec<Change>>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.get_trending_changes(force_refresh).await })
    }

    /// Store a scored result, unless a newer cycle has started meanwhile
    fn commit(&self, generation: u64, account: &str, trending: &[Change]) -> Result<()> {
        let _guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_current(generation)?;

        // Losing the cache only costs a recompute next time
        if let Err(e) = self.cache.store(account, trending) {
            warn!("Could not cache trending changes for {}: {}", account, e);
        }

        self.phase.send_replace(RefreshPhase::Ready {
            changes: trending.len(),
            from_cache: false,
        });
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            debug!("Refresh cycle {} was superseded", generation);
            Err(Error::Superseded)
        }
    }

    fn publish(&self, generation: u64, phase: RefreshPhase) {
        if self.is_current(generation) {
            self.phase.send_replace(phase);
        }
    }

    /// Cache reads must not mask the progress of a running cycle
    fn publish_cache_phase(&self, phase: RefreshPhase) {
        self.phase.send_if_modified(|current| {
            if matches!(current, RefreshPhase::Fetching | RefreshPhase::Scoring) {
                false
            } else {
                *current = phase;
                true
            }
        });
    }
}
