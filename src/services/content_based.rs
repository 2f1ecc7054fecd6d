use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{MovieFeature, MovieId, SimilarMovie},
    services::feature_store::FeatureStore,
};

/// Similarities closer than this are ties, broken by genre/keyword overlap
pub const SIMILARITY_EPSILON: f32 = 1e-4;

/// Cosine similarity between two embeddings; zero vectors are dissimilar to everything
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Movie-to-movie recommender over content embeddings
///
/// Side-effect free: every answer is a function of the current feature snapshot.
#[derive(Clone)]
pub struct ContentRecommender {
    features: Arc<FeatureStore>,
}

struct Neighbour {
    movie_id: MovieId,
    similarity: f32,
    overlap: usize,
}

impl ContentRecommender {
    pub fn new(features: Arc<FeatureStore>) -> Self {
        Self { features }
    }

    /// Up to `k` movies most similar to `movie_id`, excluding itself and `exclude`
    pub fn similar(
        &self,
        movie_id: MovieId,
        k: usize,
        exclude: &HashSet<MovieId>,
    ) -> AppResult<Vec<SimilarMovie>> {
        let target = self
            .features
            .get(movie_id)
            .ok_or_else(|| AppError::NotFound(format!("movie {} has no features", movie_id)))?;

        let mut neighbours: Vec<Neighbour> = self
            .features
            .all_movies()
            .iter()
            .filter(|m| m.movie_id != movie_id && !exclude.contains(&m.movie_id))
            .map(|m| Neighbour {
                movie_id: m.movie_id,
                similarity: cosine_similarity(&target.embedding, &m.embedding),
                overlap: target.overlap(m),
            })
            .collect();

        order_neighbours(&mut neighbours);

        Ok(neighbours
            .into_iter()
            .take(k)
            .map(|n| SimilarMovie {
                movie_id: n.movie_id,
                similarity: n.similarity,
            })
            .collect())
    }

    /// Similarity between two catalog movies, if both have features
    pub fn similarity(&self, a: MovieId, b: MovieId) -> Option<f32> {
        let a = self.features.get(a)?;
        let b = self.features.get(b)?;
        Some(cosine_similarity(&a.embedding, &b.embedding))
    }

    pub fn feature(&self, movie_id: MovieId) -> Option<Arc<MovieFeature>> {
        self.features.get(movie_id)
    }
}

/// Sorts by similarity descending; runs within epsilon of their leader are
/// reordered by overlap desc, then similarity desc, then id asc.
fn order_neighbours(neighbours: &mut [Neighbour]) {
    neighbours.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(a.movie_id.cmp(&b.movie_id))
    });

    let mut start = 0;
    while start < neighbours.len() {
        let leader = neighbours[start].similarity;
        let mut end = start + 1;
        while end < neighbours.len() && leader - neighbours[end].similarity <= SIMILARITY_EPSILON {
            end += 1;
        }
        neighbours[start..end].sort_by(|a, b| {
            b.overlap
                .cmp(&a.overlap)
                .then(b.similarity.total_cmp(&a.similarity))
                .then(a.movie_id.cmp(&b.movie_id))
        });
        start = end;
    }
}
