use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MovieId, UserId};

/// Latent factors for one user within a trained model version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserLatentProfile {
    pub user_id: UserId,
    pub factors: Vec<f32>,
    pub updated_at: DateTime<Utc>,
    /// Incremental nudges applied since the batch retrain that created it
    pub update_count: u64,
}

/// Latent factors and bias for one movie within a trained model version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieLatentProfile {
    pub movie_id: MovieId,
    pub factors: Vec<f32>,
    pub bias: f32,
    pub updated_at: DateTime<Utc>,
    pub update_count: u64,
}

/// Serializable form of a complete trained model, as handed to persistence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifact {
    pub version: u64,
    pub latent_dim: usize,
    pub global_mean: f32,
    pub trained_at: DateTime<Utc>,
    /// Log position the batch was trained through (exclusive)
    pub trained_through: u64,
    pub users: Vec<UserLatentProfile>,
    pub movies: Vec<MovieLatentProfile>,
}

/// Collaborative affinity for a (user, movie) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Affinity {
    Predicted(f32),
    /// User or movie absent from the trained factors; carries the global mean
    ColdStart { fallback: f32 },
}

impl Affinity {
    pub fn value(&self) -> f32 {
        match self {
            Affinity::Predicted(v) => *v,
            Affinity::ColdStart { fallback } => *fallback,
        }
    }

    pub fn is_cold_start(&self) -> bool {
        matches!(self, Affinity::ColdStart { .. })
    }
}
