use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};

use crate::models::{
    Affinity, ModelArtifact, MovieId, MovieLatentProfile, UserId, UserLatentProfile, MAX_RATING,
    MIN_RATING,
};

/// Largest residual a single online nudge will act on
const MAX_NUDGE_RESIDUAL: f32 = (MAX_RATING - MIN_RATING) as f32;

/// One trained model version
///
/// The set of users and movies is fixed at training time. Individual vectors
/// are nudged in place between retrains; concurrent nudges to the same key are
/// serialized by the map's per-entry write lock.
pub struct ModelSnapshot {
    version: u64,
    latent_dim: usize,
    global_mean: f32,
    trained_at: DateTime<Utc>,
    trained_through: u64,
    users: DashMap<UserId, UserLatentProfile>,
    movies: DashMap<MovieId, MovieLatentProfile>,
}

impl ModelSnapshot {
    /// Version 0: no factors, every pair is cold
    pub fn empty(latent_dim: usize) -> Self {
        Self {
            version: 0,
            latent_dim,
            global_mean: (MIN_RATING + MAX_RATING) as f32 / 2.0,
            trained_at: Utc::now(),
            trained_through: 0,
            users: DashMap::new(),
            movies: DashMap::new(),
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            version: artifact.version,
            latent_dim: artifact.latent_dim,
            global_mean: artifact.global_mean,
            trained_at: artifact.trained_at,
            trained_through: artifact.trained_through,
            users: artifact
                .users
                .into_iter()
                .map(|u| (u.user_id, u))
                .collect(),
            movies: artifact
                .movies
                .into_iter()
                .map(|m| (m.movie_id, m))
                .collect(),
        }
    }

    pub fn to_artifact(&self) -> ModelArtifact {
        let mut users: Vec<UserLatentProfile> =
            self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.user_id);
        let mut movies: Vec<MovieLatentProfile> =
            self.movies.iter().map(|m| m.value().clone()).collect();
        movies.sort_by_key(|m| m.movie_id);

        ModelArtifact {
            version: self.version,
            latent_dim: self.latent_dim,
            global_mean: self.global_mean,
            trained_at: self.trained_at,
            trained_through: self.trained_through,
            users,
            movies,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }

    pub fn trained_through(&self) -> u64 {
        self.trained_through
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn user_factors(&self, user_id: UserId) -> Option<Vec<f32>> {
        self.users.get(&user_id).map(|u| u.factors.clone())
    }

    pub fn user_profile(&self, user_id: UserId) -> Option<UserLatentProfile> {
        self.users.get(&user_id).map(|u| u.value().clone())
    }

    pub fn movie_profile(&self, movie_id: MovieId) -> Option<MovieLatentProfile> {
        self.movies.get(&movie_id).map(|m| m.value().clone())
    }

    /// Affinity of a user whose factors were already fetched
    pub fn affinity_with(&self, user_factors: Option<&[f32]>, movie_id: MovieId) -> Affinity {
        let Some(user) = user_factors else {
            return Affinity::ColdStart {
                fallback: self.global_mean,
            };
        };
        match self.movies.get(&movie_id) {
            Some(movie) => Affinity::Predicted(self.predict(user, &movie.factors, movie.bias)),
            None => Affinity::ColdStart {
                fallback: self.global_mean,
            },
        }
    }

    pub fn affinity(&self, user_id: UserId, movie_id: MovieId) -> Affinity {
        let user = self.user_factors(user_id);
        self.affinity_with(user.as_deref(), movie_id)
    }

    fn predict(&self, user: &[f32], movie: &[f32], bias: f32) -> f32 {
        let dot: f32 = user.iter().zip(movie).map(|(p, q)| p * q).sum();
        (self.global_mean + bias + dot).clamp(MIN_RATING as f32, MAX_RATING as f32)
    }

    /// Applies one weighted SGD step for an observed (user, movie, target)
    ///
    /// Returns false when either side is absent from this version; such pairs
    /// stay cold until the next batch retrain.
    pub fn nudge(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        target: f32,
        weight: f32,
        learning_rate: f32,
        regularization: f32,
    ) -> bool {
        // Lock order is always user then movie.
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return false;
        };
        let Some(mut movie) = self.movies.get_mut(&movie_id) else {
            return false;
        };

        let dot: f32 = user
            .factors
            .iter()
            .zip(&movie.factors)
            .map(|(p, q)| p * q)
            .sum();
        let residual = (target - (self.global_mean + movie.bias + dot))
            .clamp(-MAX_NUDGE_RESIDUAL, MAX_NUDGE_RESIDUAL);
        let gradient = weight * residual;

        movie.bias += learning_rate * (gradient - regularization * movie.bias);
        for f in 0..self.latent_dim.min(user.factors.len()).min(movie.factors.len()) {
            let p = user.factors[f];
            let q = movie.factors[f];
            user.factors[f] += learning_rate * (gradient * q - regularization * p);
            movie.factors[f] += learning_rate * (gradient * p - regularization * q);
        }

        let now = Utc::now();
        user.updated_at = now;
        user.update_count += 1;
        movie.updated_at = now;
        movie.update_count += 1;
        true
    }
}

/// Holder of the currently served model version
///
/// Readers clone the `Arc` once per request and keep using that version even if
/// a retrain installs a newer one meanwhile.
pub struct ModelHandle {
    current: RwLock<Arc<ModelSnapshot>>,
}

impl ModelHandle {
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn load(&self) -> Arc<ModelSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn version(&self) -> u64 {
        self.load().version()
    }

    /// Atomically replaces the served snapshot, returning the previous one
    pub fn install(&self, snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snapshot(user: UserId, movie: MovieId) -> ModelSnapshot {
        let now = Utc::now();
        ModelSnapshot::from_artifact(ModelArtifact {
            version: 7,
            latent_dim: 2,
            global_mean: 3.0,
            trained_at: now,
            trained_through: 10,
            users: vec![UserLatentProfile {
                user_id: user,
                factors: vec![0.5, 0.5],
                updated_at: now,
                update_count: 0,
            }],
            movies: vec![MovieLatentProfile {
                movie_id: movie,
                factors: vec![1.0, 0.0],
                bias: 0.25,
                updated_at: now,
                update_count: 0,
            }],
        })
    }

    #[test]
    fn test_affinity_is_mean_plus_bias_plus_dot() {
        let user = Uuid::new_v4();
        let snap = snapshot(user, 1);
        assert_eq!(snap.affinity(user, 1), Affinity::Predicted(3.75));
    }

    #[test]
    fn test_unknown_pairs_are_cold() {
        let user = Uuid::new_v4();
        let snap = snapshot(user, 1);
        assert_eq!(
            snap.affinity(Uuid::new_v4(), 1),
            Affinity::ColdStart { fallback: 3.0 }
        );
        assert!(snap.affinity(user, 2).is_cold_start());
    }

    #[test]
    fn test_nudge_moves_prediction_toward_target() {
        let user = Uuid::new_v4();
        let snap = snapshot(user, 1);
        let before = snap.affinity(user, 1).value();
        assert!(snap.nudge(user, 1, 5.0, 1.0, 0.05, 0.0));
        let after = snap.affinity(user, 1).value();
        assert!(after > before);
        assert!(after - before < 0.5);
        assert_eq!(snap.user_profile(user).unwrap().update_count, 1);
        assert_eq!(snap.movie_profile(1).unwrap().update_count, 1);
    }

    #[test]
    fn test_nudge_skips_unknown_pairs() {
        let user = Uuid::new_v4();
        let snap = snapshot(user, 1);
        assert!(!snap.nudge(Uuid::new_v4(), 1, 5.0, 1.0, 0.05, 0.0));
        assert!(!snap.nudge(user, 2, 5.0, 1.0, 0.05, 0.0));
    }

    #[test]
    fn test_install_swaps_whole_snapshot() {
        let user = Uuid::new_v4();
        let handle = ModelHandle::new(ModelSnapshot::empty(2));
        let held = handle.load();
        let previous = handle.install(snapshot(user, 1));
        assert_eq!(previous.version(), 0);
        assert_eq!(handle.version(), 7);
        // a reader that loaded before the swap keeps its own version
        assert_eq!(held.version(), 0);
        assert!(held.affinity(user, 1).is_cold_start());
    }

    #[test]
    fn test_artifact_round_trip_preserves_factors() {
        let user = Uuid::new_v4();
        let snap = snapshot(user, 1);
        let restored = ModelSnapshot::from_artifact(snap.to_artifact());
        assert_eq!(restored.affinity(user, 1), snap.affinity(user, 1));
        assert_eq!(restored.trained_through(), 10);
    }
}
