use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::{
    config::EngineConfig,
    db::{CacheKey, Lookup, Persistence, RecommendationCache},
    error::{AppError, AppResult},
    models::{
        Ack, Explanation, FeedbackEvent, Mood, MoodOutcome, MovieFeature, MovieId,
        RecommendationContext, RecommendationResult, ScoredMovie, SimilarMovie, TrendingMovie,
        UserId,
    },
    services::{
        collaborative::{CollaborativeRecommender, ModelHandle, ModelSnapshot},
        content_based::ContentRecommender,
        feature_store::FeatureStore,
        feedback::FeedbackIngestor,
        fusion::FusionRanker,
        mood::{infer_mood, MoodClassifier, MoodIndex, MoodScorer},
    },
};

/// Longest look-back accepted for mood inference
const MAX_MOOD_INFERENCE_DAYS: u64 = 36_500;

/// Serving facade over the hybrid recommender
///
/// Owns every component and the currently served model snapshot. Cloned into
/// request handlers behind an `Arc`.
pub struct RecommendationEngine {
    config: EngineConfig,
    store: Arc<dyn Persistence>,
    features: Arc<FeatureStore>,
    model: Arc<ModelHandle>,
    content: ContentRecommender,
    collaborative: CollaborativeRecommender,
    mood_scorer: MoodScorer,
    moods: Arc<MoodIndex>,
    ranker: FusionRanker,
    cache: Arc<RecommendationCache>,
    feedback: FeedbackIngestor,
    /// Held for the whole of a retrain; at most one runs at a time
    retrain_lock: Mutex<()>,
}

impl RecommendationEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Persistence>,
        classifier: Arc<dyn MoodClassifier>,
    ) -> Self {
        let features = Arc::new(FeatureStore::new(config.embedding_dim));
        let model = Arc::new(ModelHandle::new(ModelSnapshot::empty(
            config.training.latent_dim,
        )));
        let content = ContentRecommender::new(Arc::clone(&features));
        let collaborative = CollaborativeRecommender::new(
            Arc::clone(&model),
            Arc::clone(&features),
            config.training.clone(),
        );
        let moods = Arc::new(MoodIndex::new());
        let ranker = FusionRanker::new(
            Arc::clone(&features),
            content.clone(),
            collaborative.clone(),
            Arc::clone(&moods),
            config.fusion.clone(),
        );
        let cache = Arc::new(
            RecommendationCache::new(config.cache_ttl).with_sweep_every(config.cache_sweep_every),
        );
        let feedback = FeedbackIngestor::new(
            Arc::clone(&store),
            Arc::clone(&features),
            collaborative.clone(),
            Arc::clone(&cache),
        );

        Self {
            mood_scorer: MoodScorer::new(classifier, config.min_review_count),
            config,
            store,
            features,
            model,
            content,
            collaborative,
            moods,
            ranker,
            cache,
            feedback,
            retrain_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<RecommendationCache> {
        &self.cache
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn features(&self) -> &Arc<FeatureStore> {
        &self.features
    }

    /// Restores catalog, feedback log and model from the persistence store
    ///
    /// Events logged after the restored model was trained are replayed as
    /// nudges. A log without any model is trained from scratch.
    pub async fn restore(&self) -> AppResult<()> {
        // Catalog, then the log, then the model trained on that log
        let mut restored_movies = 0usize;
        for feature in self.store.load_features().await? {
            let movie_id = feature.movie_id;
            match self.features.upsert(feature) {
                Ok(()) => restored_movies += 1,
                Err(e) => tracing::warn!(movie_id, error = %e, "Skipping stored movie feature"),
            }
        }

        let events = self.store.load_events().await?;
        let has_events = !events.is_empty();
        self.feedback.restore(events).await;

        match self.store.load_model().await? {
            Some(artifact) if artifact.latent_dim == self.config.training.latent_dim => {
                let trained_through = artifact.trained_through;
                let snapshot = ModelSnapshot::from_artifact(artifact);
                let version = snapshot.version();
                self.model.install(snapshot);
                let replayed = self.replay_since(trained_through).await;
                tracing::info!(version, replayed, "Restored model snapshot");
            }
            Some(artifact) => {
                tracing::warn!(
                    stored = artifact.latent_dim,
                    configured = self.config.training.latent_dim,
                    "Stored model has a different latent dimension, ignoring it"
                );
            }
            None => {}
        }

        tracing::info!(
            movies = restored_movies,
            model_version = self.model.version(),
            "Engine state restored"
        );

        if has_events && self.model.version() == 0 {
            self.retrain().await?;
        }
        Ok(())
    }

    /// GetRecommendations: fused top-k for a user and context
    ///
    /// A solo request without a mood takes the mood inferred from the user's
    /// recent ratings, if any; the result's context shows the mood applied.
    pub async fn get_recommendations(
        self: &Arc<Self>,
        user_id: UserId,
        context: RecommendationContext,
        k: usize,
    ) -> AppResult<Arc<RecommendationResult>> {
        let k = self.clamp_k(k)?;
        let start = Instant::now();
        let context = self.with_inferred_mood(user_id, context);
        let key = CacheKey::new(user_id, context.clone(), k);

        let engine = Arc::clone(self);
        let (result, lookup) = self
            .cache
            .get_or_compute(key, move || async move {
                tokio::task::spawn_blocking(move || engine.compute(user_id, &context, k)).await?
            })
            .await;

        let cache = match lookup {
            Lookup::Hit => "hit",
            Lookup::Joined => "joined",
            Lookup::Computed => "miss",
        };
        tracing::info!(
            user_id = %user_id,
            k,
            cache,
            elapsed_ms = start.elapsed().as_millis(),
            "Recommendations served"
        );

        result
    }

    fn with_inferred_mood(
        &self,
        user_id: UserId,
        mut context: RecommendationContext,
    ) -> RecommendationContext {
        let days = self.config.mood_inference_days.min(MAX_MOOD_INFERENCE_DAYS);
        if context.mood.is_some() || context.is_group(user_id) || days == 0 {
            return context;
        }

        let since = Utc::now() - chrono::Duration::days(days as i64);
        context.mood = infer_mood(&self.features.recent_genres(user_id, since));
        if let Some(mood) = context.mood {
            tracing::debug!(user_id = %user_id, mood = mood.as_str(), "Inferred mood from recent ratings");
        }
        context
    }

    /// Fusion with one automatic retry when a retrain swaps the model mid-computation
    fn compute(
        &self,
        user_id: UserId,
        context: &RecommendationContext,
        k: usize,
    ) -> AppResult<RecommendationResult> {
        match self.compute_once(user_id, context, k) {
            Err(AppError::StaleModel { served, current }) => {
                tracing::warn!(served, current, "Model swapped during fusion, retrying once");
                self.compute_once(user_id, context, k)
            }
            other => other,
        }
    }

    fn compute_once(
        &self,
        user_id: UserId,
        context: &RecommendationContext,
        k: usize,
    ) -> AppResult<RecommendationResult> {
        let snapshot = self.model.load();
        let items = self.ranker.rank(&snapshot, user_id, context, k);
        self.seal(&snapshot, user_id, context, items)
    }

    /// Wraps a ranking computed against `snapshot`, unless that snapshot is no longer served
    fn seal(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        context: &RecommendationContext,
        items: Vec<ScoredMovie>,
    ) -> AppResult<RecommendationResult> {
        let current = self.model.version();
        if current != snapshot.version() {
            return Err(AppError::StaleModel {
                served: snapshot.version(),
                current,
            });
        }

        let generated_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::zero());
        Ok(RecommendationResult {
            user_id,
            context: context.clone(),
            items,
            model_version: snapshot.version(),
            generated_at,
            valid_until: generated_at + ttl,
        })
    }

    /// GetSimilarMovies: content neighbours of a catalog movie
    pub fn get_similar_movies(&self, movie_id: MovieId, k: usize) -> AppResult<Vec<SimilarMovie>> {
        let k = self.clamp_k(k)?;
        self.content.similar(movie_id, k, &HashSet::new())
    }

    /// RecordFeedback: idempotent append, nudge and invalidation
    ///
    /// Every `retrain_every_events` accepted events a background retrain is
    /// started unless one is already running.
    pub async fn record_feedback(self: &Arc<Self>, feedback: FeedbackEvent) -> AppResult<Ack> {
        let recorded = self.feedback.record(feedback).await?;

        let every = self.config.training.retrain_every_events;
        let due = recorded
            .accepted
            .is_some_and(|count| every > 0 && count % every == 0);
        if due {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let Ok(_guard) = engine.retrain_lock.try_lock() else {
                    tracing::debug!("Retrain already running, skipping trigger");
                    return;
                };
                if let Err(e) = engine.retrain_locked().await {
                    tracing::error!(error = %e, "Background retrain failed");
                }
            });
        }

        Ok(recorded.ack)
    }

    /// Trending-for-you: popular unseen movies reordered by the user's genre taste
    ///
    /// Without any genre preference this is plain popularity order.
    pub fn trending_for(&self, user_id: UserId, k: usize) -> AppResult<Vec<TrendingMovie>> {
        let k = self.clamp_k(k)?;
        let seen = self.features.interacted(user_id);

        // Most popular unseen movies form the pool
        let mut pool: Vec<Arc<MovieFeature>> = self
            .features
            .all_movies()
            .into_iter()
            .filter(|m| !seen.contains(&m.movie_id))
            .collect();
        pool.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then(a.movie_id.cmp(&b.movie_id))
        });
        pool.truncate(k.saturating_mul(self.config.fusion.candidate_multiplier));

        // Then reorder by taste
        let preferences = self.features.genre_preferences(user_id);
        let mut trending: Vec<TrendingMovie> = pool
            .iter()
            .map(|m| TrendingMovie {
                movie_id: m.movie_id,
                preference: m.genres.iter().filter_map(|g| preferences.get(g)).sum(),
                popularity: m.popularity,
            })
            .collect();
        trending.sort_by(|a, b| {
            b.preference
                .total_cmp(&a.preference)
                .then(b.popularity.total_cmp(&a.popularity))
                .then(a.movie_id.cmp(&b.movie_id))
        });
        trending.truncate(k);

        tracing::debug!(
            user_id = %user_id,
            genres = preferences.len(),
            returned = trending.len(),
            "Personalized trending"
        );
        Ok(trending)
    }

    /// GetModelVersion
    pub fn model_version(&self) -> u64 {
        self.model.version()
    }

    /// Batch retrain on the full log and atomic swap; returns the new version
    pub async fn retrain(&self) -> AppResult<u64> {
        let _guard = self.retrain_lock.lock().await;
        self.retrain_locked().await
    }

    async fn retrain_locked(&self) -> AppResult<u64> {
        let events = self.feedback.events().await;
        let cutoff = events.len() as u64;
        tracing::info!(events = cutoff, "Starting batch retrain");

        let snapshot = self.collaborative.train(events).await?;
        let artifact = snapshot.to_artifact();
        let version = snapshot.version();

        // Swap, catch up on events logged during training, then drop stale rankings
        let previous = self.model.install(snapshot);
        let replayed = self.replay_since(cutoff).await;
        self.cache.clear();

        tracing::info!(
            version,
            previous = previous.version(),
            replayed,
            "Installed new model version"
        );

        if let Err(e) = self.store.save_model(&artifact).await {
            tracing::error!(version, error = %e, "Failed to persist model artifact");
        }
        Ok(version)
    }

    /// Nudges the served snapshot with every logged event from `from` onwards
    async fn replay_since(&self, from: u64) -> usize {
        let snapshot = self.model.load();
        let events = self.feedback.events_since(from).await;
        for event in &events {
            self.collaborative.nudge_in(&snapshot, event);
        }
        events.len()
    }

    /// Explain: reasons a movie would be recommended to a user
    pub fn explain(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        mood: Option<Mood>,
    ) -> AppResult<Explanation> {
        self.ranker
            .explain(&self.model.load(), user_id, movie_id, mood)
    }

    /// UpsertMovie: catalog stream entry point
    pub async fn upsert_movie(&self, feature: MovieFeature) -> AppResult<()> {
        self.features.upsert(feature.clone())?;
        self.store.save_feature(&feature).await?;
        tracing::info!(movie_id = feature.movie_id, "Movie features upserted");
        Ok(())
    }

    /// Bulk catalog load at startup; invalid records are skipped and logged
    pub async fn load_catalog(&self, catalog: Vec<MovieFeature>) -> AppResult<usize> {
        let mut loaded = 0;
        for feature in catalog {
            let movie_id = feature.movie_id;
            match self.upsert_movie(feature).await {
                Ok(()) => loaded += 1,
                Err(AppError::Validation(msg)) => {
                    tracing::warn!(movie_id, reason = %msg, "Skipping catalog entry")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(loaded)
    }

    /// IngestReviews: review-volume trigger for mood recomputation
    pub fn ingest_reviews(&self, movie_id: MovieId, reviews: &[String]) -> AppResult<MoodOutcome> {
        if !self.features.contains(movie_id) {
            return Err(AppError::NotFound(format!("movie {} has no features", movie_id)));
        }

        let outcome = self.mood_scorer.mood_of(movie_id, reviews);
        tracing::info!(
            movie_id,
            reviews = reviews.len(),
            informative = outcome.is_informative(),
            dominant = ?outcome.vector().dominant().map(|(m, _)| m),
            "Mood recomputed"
        );
        self.moods.store(outcome.clone());
        Ok(outcome)
    }

    fn clamp_k(&self, k: usize) -> AppResult<usize> {
        if k == 0 {
            return Err(AppError::Validation("k must be at least 1".to_string()));
        }
        Ok(k.min(self.config.fusion.max_recommendations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{EventKind, Genre};
    use crate::services::mood::LexiconClassifier;
    use uuid::Uuid;

    fn engine() -> Arc<RecommendationEngine> {
        let config = EngineConfig {
            embedding_dim: 2,
            ..EngineConfig::default()
        };
        Arc::new(RecommendationEngine::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(LexiconClassifier::default()),
        ))
    }

    fn movie(movie_id: MovieId, genre: Genre, embedding: [f32; 2], popularity: f64) -> MovieFeature {
        MovieFeature {
            movie_id,
            embedding: embedding.to_vec(),
            genres: vec![genre],
            keywords: Default::default(),
            release_epoch: 0,
            popularity,
        }
    }

    fn rating(user: UserId, movie_id: MovieId, value: u8) -> FeedbackEvent {
        FeedbackEvent {
            event_id: Some(Uuid::new_v4()),
            user_id: Some(user),
            movie_id: Some(movie_id),
            kind: EventKind::Rating { value },
            timestamp: None,
            context: None,
        }
    }

    #[tokio::test]
    async fn test_k_zero_is_rejected_and_large_k_clamped() {
        let engine = engine();
        engine
            .upsert_movie(movie(1, Genre::Drama, [1.0, 0.0], 1.0))
            .await
            .unwrap();

        let err = engine
            .get_recommendations(Uuid::new_v4(), RecommendationContext::solo(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(engine.clamp_k(10_000).unwrap(), 50);
    }

    #[tokio::test]
    async fn test_seal_detects_swapped_model() {
        let engine = engine();
        let served = engine.model().load();
        engine.model().install(ModelSnapshot::from_artifact(crate::models::ModelArtifact {
            version: 9,
            latent_dim: 16,
            global_mean: 3.0,
            trained_at: Utc::now(),
            trained_through: 0,
            users: Vec::new(),
            movies: Vec::new(),
        }));

        let user = Uuid::new_v4();
        let err = engine
            .seal(&served, user, &RecommendationContext::solo(), Vec::new())
            .unwrap_err();
        assert_eq!(err, AppError::StaleModel { served: 0, current: 9 });

        let fresh = engine
            .compute(user, &RecommendationContext::solo(), 5)
            .unwrap();
        assert_eq!(fresh.model_version, 9);
    }

    #[tokio::test]
    async fn test_retrain_installs_next_version_and_clears_cache() {
        let engine = engine();
        for (id, genre) in [(1, Genre::Drama), (2, Genre::Comedy), (3, Genre::Action)] {
            engine
                .upsert_movie(movie(id, genre, [1.0, id as f32], id as f64))
                .await
                .unwrap();
        }
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        engine.record_feedback(rating(a, 1, 5)).await.unwrap();
        engine.record_feedback(rating(b, 2, 3)).await.unwrap();

        let before = engine
            .get_recommendations(a, RecommendationContext::solo(), 5)
            .await
            .unwrap();
        assert_eq!(before.model_version, 0);
        assert_eq!(engine.cache().len(), 1);

        assert_eq!(engine.retrain().await.unwrap(), 1);
        assert_eq!(engine.model_version(), 1);
        assert!(engine.cache().is_empty());

        let after = engine
            .get_recommendations(a, RecommendationContext::solo(), 5)
            .await
            .unwrap();
        assert_eq!(after.model_version, 1);
        assert!(!after.movie_ids().contains(&1));
    }

    #[tokio::test]
    async fn test_restore_replays_log_and_trains() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            embedding_dim: 2,
            ..EngineConfig::default()
        };
        let user = Uuid::new_v4();
        {
            let first = Arc::new(RecommendationEngine::new(
                config.clone(),
                Arc::clone(&store) as Arc<dyn Persistence>,
                Arc::new(LexiconClassifier::default()),
            ));
            first
                .upsert_movie(movie(1, Genre::Drama, [1.0, 0.0], 1.0))
                .await
                .unwrap();
            first.record_feedback(rating(user, 1, 5)).await.unwrap();
        }

        let second = RecommendationEngine::new(
            config,
            Arc::clone(&store) as Arc<dyn Persistence>,
            Arc::new(LexiconClassifier::default()),
        );
        second.restore().await.unwrap();
        assert!(second.features().contains(1));
        assert_eq!(second.features().rating_of(user, 1), Some(5));
        assert_eq!(second.model_version(), 1);
    }

    #[tokio::test]
    async fn test_ingest_reviews_requires_known_movie() {
        let engine = engine();
        let reviews = vec!["hilarious".to_string()];
        let err = engine.ingest_reviews(4, &reviews).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        engine
            .upsert_movie(movie(4, Genre::Comedy, [0.0, 1.0], 1.0))
            .await
            .unwrap();
        let outcome = engine.ingest_reviews(4, &reviews).unwrap();
        assert!(!outcome.is_informative());
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let engine = engine();
        let mut bad = movie(1, Genre::Drama, [1.0, 0.0], 1.0);
        bad.embedding.push(0.5);
        assert!(matches!(
            engine.upsert_movie(bad).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(
            engine.get_similar_movies(1, 5).unwrap_err(),
            AppError::NotFound("movie 1 has no features".to_string())
        );
    }

    #[tokio::test]
    async fn test_auto_retrain_triggers_on_every_nth_event() {
        let config = EngineConfig {
            embedding_dim: 2,
            training: crate::config::TrainingConfig {
                retrain_every_events: 2,
                ..crate::config::TrainingConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = Arc::new(RecommendationEngine::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(LexiconClassifier::default()),
        ));
        engine
            .upsert_movie(movie(1, Genre::Drama, [1.0, 0.0], 1.0))
            .await
            .unwrap();

        engine.record_feedback(rating(Uuid::new_v4(), 1, 4)).await.unwrap();
        assert_eq!(engine.model_version(), 0);
        engine.record_feedback(rating(Uuid::new_v4(), 1, 2)).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while engine.model_version() != 1 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_solo_request_infers_mood_from_recent_ratings() {
        let engine = engine();
        for (id, genre) in [(1, Genre::Horror), (2, Genre::Comedy), (3, Genre::Thriller)] {
            engine
                .upsert_movie(movie(id, genre, [1.0, id as f32], 1.0))
                .await
                .unwrap();
        }
        let (user, friend) = (Uuid::new_v4(), Uuid::new_v4());
        engine.record_feedback(rating(user, 1, 5)).await.unwrap();

        let inferred = engine
            .get_recommendations(user, RecommendationContext::solo(), 5)
            .await
            .unwrap();
        assert_eq!(inferred.context.mood, Some(Mood::Scary));

        let explicit = engine
            .get_recommendations(user, RecommendationContext::with_mood(Mood::Comedic), 5)
            .await
            .unwrap();
        assert_eq!(explicit.context.mood, Some(Mood::Comedic));

        let group = RecommendationContext {
            mood: None,
            group: [friend].into_iter().collect(),
        };
        let together = engine.get_recommendations(user, group, 5).await.unwrap();
        assert_eq!(together.context.mood, None);

        let newcomer = engine
            .get_recommendations(Uuid::new_v4(), RecommendationContext::solo(), 5)
            .await
            .unwrap();
        assert_eq!(newcomer.context.mood, None);
    }

    #[tokio::test]
    async fn test_mood_inference_can_be_disabled() {
        let engine = Arc::new(RecommendationEngine::new(
            EngineConfig {
                embedding_dim: 2,
                mood_inference_days: 0,
                ..EngineConfig::default()
            },
            Arc::new(MemoryStore::new()),
            Arc::new(LexiconClassifier::default()),
        ));
        for (id, genre) in [(1, Genre::Horror), (2, Genre::Comedy)] {
            engine
                .upsert_movie(movie(id, genre, [1.0, id as f32], 1.0))
                .await
                .unwrap();
        }
        let user = Uuid::new_v4();
        engine.record_feedback(rating(user, 1, 5)).await.unwrap();

        let result = engine
            .get_recommendations(user, RecommendationContext::solo(), 5)
            .await
            .unwrap();
        assert_eq!(result.context.mood, None);
    }

    #[tokio::test]
    async fn test_trending_follows_genre_taste() {
        let engine = engine();
        let catalog = [
            (1, Genre::Comedy, 90.0),
            (2, Genre::Comedy, 80.0),
            (3, Genre::Horror, 70.0),
            (4, Genre::Horror, 60.0),
            (5, Genre::Drama, 100.0),
            (6, Genre::Horror, 10.0),
            (7, Genre::Comedy, 5.0),
        ];
        for (id, genre, popularity) in catalog {
            engine
                .upsert_movie(movie(id, genre, [1.0, 0.0], popularity))
                .await
                .unwrap();
        }

        let newcomer: Vec<MovieId> = engine
            .trending_for(Uuid::new_v4(), 3)
            .unwrap()
            .iter()
            .map(|t| t.movie_id)
            .collect();
        assert_eq!(newcomer, vec![5, 1, 2]);

        // Loves horror, dislikes comedy
        let user = Uuid::new_v4();
        for event in [
            rating(user, 3, 5),
            rating(user, 4, 5),
            rating(user, 1, 1),
            rating(user, 2, 1),
        ] {
            engine.record_feedback(event).await.unwrap();
        }

        let trending = engine.trending_for(user, 3).unwrap();
        let ids: Vec<MovieId> = trending.iter().map(|t| t.movie_id).collect();
        assert_eq!(ids, vec![6, 5, 7]);
        assert!((trending[0].preference - 1.0).abs() < 1e-6);
        assert_eq!(trending[1].preference, 0.0);
        assert!((trending[2].preference + 0.6).abs() < 1e-6);

        assert!(matches!(engine.trending_for(user, 0), Err(AppError::Validation(_))));
    }
}
