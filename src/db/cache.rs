use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::{
    error::{AppError, AppResult},
    models::{RecommendationContext, RecommendationResult, UserId},
};

/// Cache key for one fused ranking request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: UserId,
    pub context: RecommendationContext,
    pub k: usize,
}

impl CacheKey {
    pub fn new(user_id: UserId, context: RecommendationContext, k: usize) -> Self {
        Self {
            user_id,
            context,
            k,
        }
    }

    /// Whether feedback from `user_id` can change this entry
    pub fn involves(&self, user_id: UserId) -> bool {
        self.user_id == user_id || self.context.group.contains(&user_id)
    }

    fn members(&self) -> Vec<UserId> {
        self.context.members(self.user_id).into_iter().collect()
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mood = self
            .context
            .mood
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "any".to_string());
        let group: Vec<String> = self.context.group.iter().map(|u| u.to_string()).collect();
        write!(
            f,
            "recs:{}:{}:[{}]:{}",
            self.user_id,
            mood,
            group.join(","),
            self.k
        )
    }
}

/// How a cached lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    /// Waited on a computation another caller had already started
    Joined,
    Computed,
}

type Outcome = Arc<AppResult<Arc<RecommendationResult>>>;

const DEFAULT_SWEEP_EVERY: u64 = 256;

struct CachedEntry {
    result: Arc<RecommendationResult>,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct Flight {
    id: u64,
    rx: watch::Receiver<Option<Outcome>>,
}

/// Memoized fused rankings with a bounded validity window
///
/// Concurrent misses on the same key collapse into one computation whose
/// outcome every waiter receives. Feedback invalidates a user's entries
/// eagerly; expiry is checked on read and by a periodic sweep.
pub struct RecommendationCache {
    entries: DashMap<CacheKey, CachedEntry>,
    in_flight: DashMap<CacheKey, Flight>,
    /// Bumped on every invalidation so stale flights do not repopulate
    generations: DashMap<UserId, u64>,
    /// Bumped on every full clear and every generation prune
    epoch: AtomicU64,
    ttl: Duration,
    /// Sweep after this many inserts; 0 disables
    sweep_every: u64,
    inserts: AtomicU64,
    next_flight: AtomicU64,
    computations: AtomicU64,
}

impl RecommendationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            generations: DashMap::new(),
            epoch: AtomicU64::new(0),
            ttl,
            sweep_every: DEFAULT_SWEEP_EVERY,
            inserts: AtomicU64::new(0),
            next_flight: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    pub fn with_sweep_every(mut self, inserts: u64) -> Self {
        self.sweep_every = inserts;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of computations started through `get_or_compute`
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<RecommendationResult>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Some(Arc::clone(&entry.result)),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired());
            tracing::debug!(key = %key, "Cache entry expired");
        }
        None
    }

    pub fn put(&self, key: CacheKey, result: Arc<RecommendationResult>) {
        self.insert(key, result);
        self.maybe_sweep();
    }

    fn insert(&self, key: CacheKey, result: Arc<RecommendationResult>) {
        self.entries.insert(
            key,
            CachedEntry {
                result,
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn maybe_sweep(&self) {
        if self.sweep_every == 0 {
            return;
        }
        if self.inserts.load(Ordering::Relaxed) >= self.sweep_every {
            self.inserts.store(0, Ordering::Relaxed);
            self.sweep();
        }
    }

    /// Drops expired entries and generation counters no entry or flight depends on
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        let expired = before.saturating_sub(self.entries.len());

        let mut live: HashSet<UserId> = HashSet::new();
        for entry in self.entries.iter() {
            live.extend(entry.key().members());
        }
        for flight in self.in_flight.iter() {
            live.extend(flight.key().members());
        }
        let tracked = self.generations.len();
        self.generations.retain(|user, _| live.contains(user));
        let pruned = tracked.saturating_sub(self.generations.len());
        // A pruned user reads as generation 0 again; retire flights that captured an older view.
        if pruned > 0 {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }

        tracing::debug!(expired, pruned, remaining = self.entries.len(), "Swept recommendation cache");
        expired
    }

    /// Drops every entry the user's feedback can affect, returning how many
    pub fn invalidate(&self, user_id: UserId) -> usize {
        *self.generations.entry(user_id).or_insert(0) += 1;

        let before = self.entries.len();
        self.entries.retain(|key, _| !key.involves(user_id));
        // Later callers must not join a flight computed before this feedback.
        self.in_flight.retain(|key, _| !key.involves(user_id));
        let removed = before.saturating_sub(self.entries.len());

        tracing::debug!(user_id = %user_id, removed, "Invalidated cached recommendations");
        removed
    }

    /// Drops every entry, e.g. after a new model version is installed
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
        self.in_flight.clear();
    }

    fn generations_for(&self, key: &CacheKey) -> (u64, Vec<(UserId, u64)>) {
        let users = key
            .members()
            .into_iter()
            .map(|u| (u, self.generations.get(&u).map(|g| *g).unwrap_or(0)))
            .collect();
        (self.epoch.load(Ordering::SeqCst), users)
    }

    /// Returns the cached ranking or computes it, at most once per key at a time
    ///
    /// The computation runs on its own task: a caller that stops waiting does
    /// not cancel it, and its result still lands in the cache for other waiters.
    pub async fn get_or_compute<F, Fut>(
        self: &Arc<Self>,
        key: CacheKey,
        compute: F,
    ) -> (AppResult<Arc<RecommendationResult>>, Lookup)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<RecommendationResult>> + Send + 'static,
    {
        if let Some(hit) = self.get(&key) {
            return (Ok(hit), Lookup::Hit);
        }

        // Join a running computation or start one
        let (mut rx, lookup) = match self.in_flight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(flight) => {
                (flight.get().rx.clone(), Lookup::Joined)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                // A flight may have finished between the first lookup and here.
                if let Some(hit) = self.get(&key) {
                    return (Ok(hit), Lookup::Hit);
                }

                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                slot.insert(Flight { id, rx: rx.clone() });
                self.computations.fetch_add(1, Ordering::Relaxed);

                let cache = Arc::clone(self);
                let flight_key = key.clone();
                let generations = self.generations_for(&key);
                tokio::spawn(async move {
                    let outcome = match tokio::spawn(compute()).await {
                        Ok(result) => result.map(Arc::new),
                        Err(e) => Err(AppError::Internal(format!("ranking task failed: {}", e))),
                    };

                    // Write back only if no invalidation or clear happened meanwhile
                    if let Ok(result) = &outcome {
                        if cache.generations_for(&flight_key) == generations {
                            cache.insert(flight_key.clone(), Arc::clone(result));
                            // An invalidation or clear may have landed between the check and the put.
                            if cache.generations_for(&flight_key) != generations {
                                cache
                                    .entries
                                    .remove_if(&flight_key, |_, e| Arc::ptr_eq(&e.result, result));
                            }
                        } else {
                            tracing::debug!(
                                key = %flight_key,
                                "Discarding ranking computed before an invalidation"
                            );
                        }
                    }

                    cache.in_flight.remove_if(&flight_key, |_, f| f.id == id);
                    tx.send_replace(Some(Arc::new(outcome)));
                    cache.maybe_sweep();
                });

                (rx, Lookup::Computed)
            }
        };

        // Every waiter receives the same outcome
        let outcome = match rx.wait_for(|v| v.is_some()).await {
            Ok(value) => value.as_ref().map(Arc::clone),
            Err(_) => None,
        };

        match outcome {
            Some(shared) => ((*shared).clone(), lookup),
            None => (
                Err(AppError::Internal(
                    "ranking computation ended without a result".to_string(),
                )),
                lookup,
            ),
        }
    }
}
