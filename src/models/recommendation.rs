use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Genre, Mood, MovieId, UserId};

/// Request context that shapes a recommendation list
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecommendationContext {
    #[serde(default)]
    pub mood: Option<Mood>,
    /// Other members of a watch party. Empty for a solo request.
    #[serde(default)]
    pub group: BTreeSet<UserId>,
}

impl RecommendationContext {
    pub fn solo() -> Self {
        Self::default()
    }

    pub fn with_mood(mood: Mood) -> Self {
        Self {
            mood: Some(mood),
            group: BTreeSet::new(),
        }
    }

    /// All users whose taste the list must satisfy, requester included
    pub fn members(&self, requester: UserId) -> BTreeSet<UserId> {
        let mut members = self.group.clone();
        members.insert(requester);
        members
    }

    pub fn is_group(&self, requester: UserId) -> bool {
        self.members(requester).len() > 1
    }
}

/// Per-signal contributions behind a composite score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    /// Normalized content similarity to the user's seed movies
    pub content: f32,
    /// Normalized collaborative score; absent when the pair is untrained
    pub collaborative: Option<f32>,
    /// Normalized popularity standing in for an untrained pair, discounted
    /// when other candidates for the same user are trained
    pub popularity: Option<f32>,
    /// Mood alignment; absent without a mood filter or mood data
    pub mood: Option<f32>,
    /// Diversity multiplier applied to the weighted sum (1.0 when unpenalized)
    pub diversity_multiplier: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMovie {
    pub movie_id: MovieId,
    pub score: f32,
    pub primary_genre: Option<Genre>,
    pub popularity: f64,
    pub breakdown: SignalBreakdown,
}

/// Fused ranking for one (user, context) request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub user_id: UserId,
    pub context: RecommendationContext,
    pub items: Vec<ScoredMovie>,
    /// Model snapshot every latent vector in this result came from
    pub model_version: u64,
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl RecommendationResult {
    pub fn movie_ids(&self) -> Vec<MovieId> {
        self.items.iter().map(|i| i.movie_id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarMovie {
    pub movie_id: MovieId,
    pub similarity: f32,
}

/// Popular movie ranked by the user's genre taste
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendingMovie {
    pub movie_id: MovieId,
    /// Sum of the user's preferences over the movie's genres
    pub preference: f32,
    pub popularity: f64,
}

/// One reason a movie would be recommended to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reason {
    SimilarTo {
        seed_movie_id: MovieId,
        seed_rating: u8,
        similarity: f32,
        shared_genres: Vec<Genre>,
    },
    PredictedAffinity {
        score: f32,
    },
    ColdStart {
        global_mean: f32,
    },
    MoodMatch {
        mood: Mood,
        probability: f32,
    },
    Popular {
        popularity: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub model_version: u64,
    pub reasons: Vec<Reason>,
}
