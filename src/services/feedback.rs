use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    db::{Persistence, RecommendationCache},
    error::AppResult,
    models::{Ack, FeedbackEvent, InteractionEvent},
    services::{collaborative::CollaborativeRecommender, feature_store::FeatureStore},
};

/// Outcome of one `record` call
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub ack: Ack,
    /// Running accepted count including this event; `None` for a duplicate
    pub accepted: Option<u64>,
}

/// Records feedback into the append-only log and fans it out
///
/// Each accepted event is persisted, folded into the user's history and
/// nudged into the served model before the user's cached rankings are dropped.
pub struct FeedbackIngestor {
    store: Arc<dyn Persistence>,
    features: Arc<FeatureStore>,
    collaborative: CollaborativeRecommender,
    cache: Arc<RecommendationCache>,
    /// Event ids already accepted (or being persisted)
    claimed: DashMap<Uuid, ()>,
    /// Sequence numbers equal log positions; the lock keeps them in append order
    log: Mutex<Vec<InteractionEvent>>,
    accepted: AtomicU64,
}

impl FeedbackIngestor {
    pub fn new(
        store: Arc<dyn Persistence>,
        features: Arc<FeatureStore>,
        collaborative: CollaborativeRecommender,
        cache: Arc<RecommendationCache>,
    ) -> Self {
        Self {
            store,
            features,
            collaborative,
            cache,
            claimed: DashMap::new(),
            log: Mutex::new(Vec::new()),
            accepted: AtomicU64::new(0),
        }
    }

    /// Events accepted since startup (restored events excluded)
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Idempotent on the event id: a repeated id is acknowledged and ignored
    pub async fn record(&self, mut feedback: FeedbackEvent) -> AppResult<Recorded> {
        let event_id = *feedback.event_id.get_or_insert_with(Uuid::new_v4);
        let mut event = match feedback.into_interaction(0) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Rejected feedback event");
                return Err(e);
            }
        };

        match self.claimed.entry(event_id) {
            Entry::Occupied(_) => {
                tracing::info!(event_id = %event_id, "Duplicate feedback event ignored");
                return Ok(Recorded {
                    ack: Ack {
                        event_id,
                        duplicate: true,
                        model_version: self.collaborative.model().version(),
                    },
                    accepted: None,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        // Persist under the log lock so sequence numbers match append order
        {
            let mut log = self.log.lock().await;
            event.sequence = log.len() as u64;
            if let Err(e) = self.store.append_event(&event).await {
                self.claimed.remove(&event_id);
                tracing::error!(event_id = %event_id, error = %e, "Failed to persist feedback event");
                return Err(e);
            }
            log.push(event.clone());
        }
        let accepted = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.features.contains(event.movie_id) {
            tracing::warn!(
                movie_id = event.movie_id,
                "Feedback references a movie without features"
            );
        }

        // Invalidate last: a ranking recomputed after it sees the nudged model
        self.features.record_interaction(&event);
        let nudged = self.collaborative.nudge(&event);
        let invalidated = self.cache.invalidate(event.user_id);

        tracing::info!(
            event_id = %event_id,
            user_id = %event.user_id,
            movie_id = event.movie_id,
            sequence = event.sequence,
            explicit = event.kind.is_explicit(),
            invalidated,
            nudged,
            accepted,
            "Feedback recorded"
        );

        Ok(Recorded {
            ack: Ack {
                event_id,
                duplicate: false,
                model_version: self.collaborative.model().version(),
            },
            accepted: Some(accepted),
        })
    }

    /// Rebuilds the log, idempotency set and user histories from persisted events
    pub async fn restore(&self, mut events: Vec<InteractionEvent>) {
        events.sort_by_key(|e| e.sequence);
        for event in &events {
            self.claimed.insert(event.event_id, ());
            self.features.record_interaction(event);
        }

        let mut log = self.log.lock().await;
        tracing::info!(events = events.len(), "Restored feedback log");
        *log = events;
    }

    /// Point-in-time copy of the whole log
    pub async fn events(&self) -> Vec<InteractionEvent> {
        self.log.lock().await.clone()
    }

    /// Events at or after log position `from`
    pub async fn events_since(&self, from: u64) -> Vec<InteractionEvent> {
        let log = self.log.lock().await;
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(log.len());
        log[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::db::{CacheKey, MockPersistence};
    use crate::error::AppError;
    use crate::models::{EventKind, RecommendationContext, RecommendationResult};
    use crate::services::collaborative::{ModelHandle, ModelSnapshot};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn ingestor(store: MockPersistence) -> (FeedbackIngestor, Arc<RecommendationCache>) {
        let features = Arc::new(FeatureStore::new(2));
        let cache = Arc::new(RecommendationCache::new(Duration::from_secs(60)));
        let collaborative = CollaborativeRecommender::new(
            Arc::new(ModelHandle::new(ModelSnapshot::empty(2))),
            Arc::clone(&features),
            TrainingConfig::default(),
        );
        (
            FeedbackIngestor::new(Arc::new(store), features, collaborative, Arc::clone(&cache)),
            cache,
        )
    }

    fn feedback(event_id: Uuid, user: Uuid, movie: u64) -> FeedbackEvent {
        FeedbackEvent {
            event_id: Some(event_id),
            user_id: Some(user),
            movie_id: Some(movie),
            kind: EventKind::Rating { value: 4 },
            timestamp: None,
            context: None,
        }
    }

    fn cached(cache: &RecommendationCache, user: Uuid) -> CacheKey {
        let key = CacheKey::new(user, RecommendationContext::solo(), 10);
        cache.put(
            key.clone(),
            Arc::new(RecommendationResult {
                user_id: user,
                context: RecommendationContext::solo(),
                items: Vec::new(),
                model_version: 0,
                generated_at: Utc::now(),
                valid_until: Utc::now(),
            }),
        );
        key
    }

    #[tokio::test]
    async fn test_duplicate_event_is_a_no_op() {
        let mut store = MockPersistence::new();
        store.expect_append_event().times(1).returning(|_| Ok(()));
        let (ingestor, cache) = ingestor(store);
        let (event_id, user) = (Uuid::new_v4(), Uuid::new_v4());

        let first = assert_ok!(ingestor.record(feedback(event_id, user, 7)).await);
        assert!(!first.ack.duplicate);
        assert_eq!(first.accepted, Some(1));

        let key = cached(&cache, user);
        let second = assert_ok!(ingestor.record(feedback(event_id, user, 7)).await);
        assert!(second.ack.duplicate);
        assert_eq!(second.ack.event_id, event_id);
        assert_eq!(second.accepted, None);

        assert_eq!(ingestor.len().await, 1);
        assert_eq!(ingestor.accepted(), 1);
        assert!(cache.get(&key).is_some());
    }

    #[tokio::test]
    async fn test_accepted_event_invalidates_user_cache() {
        let mut store = MockPersistence::new();
        store.expect_append_event().returning(|_| Ok(()));
        let (ingestor, cache) = ingestor(store);
        let (user, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mine = cached(&cache, user);
        let theirs = cached(&cache, other);

        assert_ok!(ingestor.record(feedback(Uuid::new_v4(), user, 7)).await);
        assert!(cache.get(&mine).is_none());
        assert!(cache.get(&theirs).is_some());
        assert_eq!(ingestor.features.rating_of(user, 7), Some(4));
    }

    #[tokio::test]
    async fn test_missing_user_is_rejected_without_persisting() {
        let mut store = MockPersistence::new();
        store.expect_append_event().never();
        let (ingestor, _) = ingestor(store);

        let mut event = feedback(Uuid::new_v4(), Uuid::new_v4(), 7);
        event.user_id = None;
        let err = assert_err!(ingestor.record(event).await);
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(ingestor.len().await, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_releases_the_event_id() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut store = MockPersistence::new();
        let counter = Arc::clone(&calls);
        store.expect_append_event().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Store("connection refused".to_string()))
            } else {
                Ok(())
            }
        });
        let (ingestor, _) = ingestor(store);
        let (event_id, user) = (Uuid::new_v4(), Uuid::new_v4());

        let err = assert_err!(ingestor.record(feedback(event_id, user, 7)).await);
        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(ingestor.len().await, 0);

        let retried = assert_ok!(ingestor.record(feedback(event_id, user, 7)).await);
        assert!(!retried.ack.duplicate);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sequences_follow_log_order() {
        let mut store = MockPersistence::new();
        store.expect_append_event().returning(|_| Ok(()));
        let (ingestor, _) = ingestor(store);
        let user = Uuid::new_v4();
        for movie in [3, 1, 2] {
            assert_ok!(ingestor.record(feedback(Uuid::new_v4(), user, movie)).await);
        }

        let sequences: Vec<u64> = ingestor.events().await.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(ingestor.events_since(2).await.len(), 1);
        assert!(ingestor.events_since(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_restore_rebuilds_idempotency() {
        let mut store = MockPersistence::new();
        store.expect_append_event().never();
        let (ingestor, _) = ingestor(store);
        let (event_id, user) = (Uuid::new_v4(), Uuid::new_v4());
        ingestor
            .restore(vec![InteractionEvent {
                event_id,
                sequence: 0,
                user_id: user,
                movie_id: 7,
                kind: EventKind::Watch,
                timestamp: Utc::now(),
            }])
            .await;

        let recorded = assert_ok!(ingestor.record(feedback(event_id, user, 7)).await);
        assert!(recorded.ack.duplicate);
        assert!(ingestor.features.interacted(user).contains(&7));
    }

    #[tokio::test]
    async fn test_concurrent_records_get_distinct_counts() {
        let mut store = MockPersistence::new();
        store.expect_append_event().returning(|_| Ok(()));
        let (ingestor, _) = ingestor(store);
        let ingestor = Arc::new(ingestor);
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|movie| {
                let ingestor = Arc::clone(&ingestor);
                tokio::spawn(async move {
                    ingestor.record(feedback(Uuid::new_v4(), user, movie)).await
                })
            })
            .collect();

        let mut counts = Vec::new();
        for handle in handles {
            let recorded = handle.await.unwrap().unwrap();
            counts.push(recorded.accepted.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=8).collect::<Vec<u64>>());
        assert_eq!(ingestor.accepted(), 8);
    }
}
