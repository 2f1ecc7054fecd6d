use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    config::TrainingConfig,
    error::AppResult,
    models::{Affinity, InteractionEvent, MovieId, UserId},
    services::feature_store::FeatureStore,
};

pub mod snapshot;
pub mod training;

pub use snapshot::{ModelHandle, ModelSnapshot};

/// Collaborative ranking of the catalog for one user
#[derive(Debug, Clone)]
pub struct CollaborativeRanking {
    pub items: Vec<(MovieId, Affinity)>,
    /// The user has no trained factors; every score is the global mean
    pub user_cold: bool,
}

/// Matrix-factorization recommender over the feedback log
#[derive(Clone)]
pub struct CollaborativeRecommender {
    model: Arc<ModelHandle>,
    features: Arc<FeatureStore>,
    config: TrainingConfig,
}

impl CollaborativeRecommender {
    pub fn new(model: Arc<ModelHandle>, features: Arc<FeatureStore>, config: TrainingConfig) -> Self {
        Self {
            model,
            features,
            config,
        }
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Predicted affinity against the currently served model
    pub fn score(&self, user_id: UserId, movie_id: MovieId) -> Affinity {
        self.model.load().affinity(user_id, movie_id)
    }

    /// Ranks every catalog movie for `user_id` against one model snapshot
    ///
    /// Already-interacted movies and `exclude` are skipped. Ties (including the
    /// all-cold case) fall back to popularity desc, then movie id asc.
    pub fn recommend_in(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        k: usize,
        exclude: &HashSet<MovieId>,
    ) -> CollaborativeRanking {
        let seen = self.features.interacted(user_id);
        let user_factors = snapshot.user_factors(user_id);

        let mut scored: Vec<(MovieId, Affinity, f64)> = self
            .features
            .all_movies()
            .iter()
            .filter(|m| !seen.contains(&m.movie_id) && !exclude.contains(&m.movie_id))
            .map(|m| {
                (
                    m.movie_id,
                    snapshot.affinity_with(user_factors.as_deref(), m.movie_id),
                    m.popularity,
                )
            })
            .collect();

        scored.sort_by(|(a_id, a, a_pop), (b_id, b, b_pop)| {
            b.value()
                .total_cmp(&a.value())
                .then(b_pop.total_cmp(a_pop))
                .then(a_id.cmp(b_id))
        });

        CollaborativeRanking {
            items: scored
                .into_iter()
                .take(k)
                .map(|(id, affinity, _)| (id, affinity))
                .collect(),
            user_cold: user_factors.is_none(),
        }
    }

    pub fn recommend(
        &self,
        user_id: UserId,
        k: usize,
        exclude: &HashSet<MovieId>,
    ) -> CollaborativeRanking {
        self.recommend_in(&self.model.load(), user_id, k, exclude)
    }

    /// Applies the bounded online update for one accepted event
    pub fn nudge(&self, event: &InteractionEvent) -> bool {
        self.nudge_in(&self.model.load(), event)
    }

    pub fn nudge_in(&self, snapshot: &ModelSnapshot, event: &InteractionEvent) -> bool {
        let (target, weight) = training::observation_for(&event.kind, &self.config);
        let applied = snapshot.nudge(
            event.user_id,
            event.movie_id,
            target,
            weight,
            self.config.online_learning_rate,
            self.config.regularization,
        );

        tracing::debug!(
            user_id = %event.user_id,
            movie_id = event.movie_id,
            model_version = snapshot.version(),
            applied,
            "Incremental nudge"
        );

        applied
    }

    /// Trains a new version from the log off the async runtime, without installing it
    pub async fn train(&self, events: Vec<InteractionEvent>) -> AppResult<ModelSnapshot> {
        let version = self.model.version() + 1;
        let config = self.config.clone();
        let start = Instant::now();
        let event_count = events.len();

        let artifact =
            tokio::task::spawn_blocking(move || training::train(&events, &config, version)).await?;

        tracing::info!(
            version,
            events = event_count,
            users = artifact.users.len(),
            movies = artifact.movies.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Batch training finished"
        );

        Ok(ModelSnapshot::from_artifact(artifact))
    }
}
