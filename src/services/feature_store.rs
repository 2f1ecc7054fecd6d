use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{Genre, InteractionEvent, MovieFeature, MovieId, UserId, MAX_RATING},
};

/// Ratings a genre needs before it counts as a preference
const MIN_GENRE_RATINGS: usize = 2;

/// Midpoint of the rating scale; preferences are centred on it
const NEUTRAL_RATING: f32 = 2.5;

/// Latest explicit rating a user gave a movie
#[derive(Debug, Clone, Copy, PartialEq)]
struct RatedMovie {
    rating: u8,
    sequence: u64,
    rated_at: DateTime<Utc>,
}

/// Genre weights of a user's recent ratings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentGenres {
    /// Sum of `rating / 5` over recent ratings of movies in each genre
    pub weights: BTreeMap<Genre, f32>,
    /// Recent ratings of movies with at least one genre
    pub ratings: usize,
}

/// Per-user interaction history derived from the feedback log
#[derive(Debug, Clone, Default)]
pub struct UserHistory {
    ratings: HashMap<MovieId, RatedMovie>,
    interacted: HashSet<MovieId>,
}

impl UserHistory {
    fn apply(&mut self, event: &InteractionEvent) {
        self.interacted.insert(event.movie_id);
        if let Some(rating) = event.kind.rating() {
            let newer = self
                .ratings
                .get(&event.movie_id)
                .map_or(true, |r| r.sequence <= event.sequence);
            if newer {
                self.ratings.insert(
                    event.movie_id,
                    RatedMovie {
                        rating,
                        sequence: event.sequence,
                        rated_at: event.timestamp,
                    },
                );
            }
        }
    }
}

/// Content features per movie and interaction history per user
///
/// Movies and users live in separate concurrent maps so a catalog refresh
/// never contends with feedback recording, and contention stays per key.
pub struct FeatureStore {
    dimension: usize,
    movies: DashMap<MovieId, Arc<MovieFeature>>,
    histories: DashMap<UserId, UserHistory>,
}

impl FeatureStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            movies: DashMap::new(),
            histories: DashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Inserts or wholesale-replaces a movie's features
    pub fn upsert(&self, feature: MovieFeature) -> AppResult<()> {
        if feature.embedding.len() != self.dimension {
            return Err(AppError::Validation(format!(
                "movie {} embedding has dimension {}, expected {}",
                feature.movie_id,
                feature.embedding.len(),
                self.dimension
            )));
        }
        if feature.embedding.iter().any(|x| !x.is_finite()) || !feature.popularity.is_finite() {
            return Err(AppError::Validation(format!(
                "movie {} has non-finite features",
                feature.movie_id
            )));
        }

        self.movies.insert(feature.movie_id, Arc::new(feature));
        Ok(())
    }

    pub fn get(&self, movie_id: MovieId) -> Option<Arc<MovieFeature>> {
        self.movies.get(&movie_id).map(|m| Arc::clone(m.value()))
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.movies.contains_key(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    /// Point-in-time copy of every movie feature, ordered by movie id
    pub fn all_movies(&self) -> Vec<Arc<MovieFeature>> {
        let mut movies: Vec<Arc<MovieFeature>> =
            self.movies.iter().map(|m| Arc::clone(m.value())).collect();
        movies.sort_by_key(|m| m.movie_id);
        movies
    }

    pub fn record_interaction(&self, event: &InteractionEvent) {
        self.histories
            .entry(event.user_id)
            .or_default()
            .apply(event);
    }

    /// Movies the user has rated, watched or clicked
    pub fn interacted(&self, user_id: UserId) -> HashSet<MovieId> {
        self.histories
            .get(&user_id)
            .map(|h| h.interacted.clone())
            .unwrap_or_default()
    }

    pub fn rating_of(&self, user_id: UserId, movie_id: MovieId) -> Option<u8> {
        self.histories
            .get(&user_id)
            .and_then(|h| h.ratings.get(&movie_id).map(|r| r.rating))
    }

    /// The user's highest-rated movies: rating desc, most recent first, then id asc
    pub fn top_rated(&self, user_id: UserId, limit: usize) -> Vec<(MovieId, u8)> {
        let Some(history) = self.histories.get(&user_id) else {
            return Vec::new();
        };

        let mut rated: Vec<(MovieId, RatedMovie)> =
            history.ratings.iter().map(|(id, r)| (*id, *r)).collect();
        rated.sort_by(|(a_id, a), (b_id, b)| {
            b.rating
                .cmp(&a.rating)
                .then(b.sequence.cmp(&a.sequence))
                .then(a_id.cmp(b_id))
        });

        rated
            .into_iter()
            .take(limit)
            .map(|(id, r)| (id, r.rating))
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.histories.len()
    }

    fn ratings_of(&self, user_id: UserId) -> Vec<(MovieId, RatedMovie)> {
        self.histories
            .get(&user_id)
            .map(|h| h.ratings.iter().map(|(id, r)| (*id, *r)).collect())
            .unwrap_or_default()
    }

    /// Per-genre taste in [-1, 1] from the user's average rating in that genre
    ///
    /// Genres rated fewer than twice are left out.
    pub fn genre_preferences(&self, user_id: UserId) -> BTreeMap<Genre, f32> {
        let mut totals: BTreeMap<Genre, (f32, usize)> = BTreeMap::new();
        for (movie_id, rated) in self.ratings_of(user_id) {
            let Some(movie) = self.get(movie_id) else {
                continue;
            };
            for genre in &movie.genres {
                let entry = totals.entry(*genre).or_insert((0.0, 0));
                entry.0 += rated.rating as f32;
                entry.1 += 1;
            }
        }

        totals
            .into_iter()
            .filter(|(_, (_, count))| *count >= MIN_GENRE_RATINGS)
            .map(|(genre, (sum, count))| {
                let average = sum / count as f32;
                (genre, (average - NEUTRAL_RATING) / NEUTRAL_RATING)
            })
            .collect()
    }

    /// Genres of the movies the user rated at or after `since`, weighted by rating
    pub fn recent_genres(&self, user_id: UserId, since: DateTime<Utc>) -> RecentGenres {
        let mut recent = RecentGenres::default();
        for (movie_id, rated) in self.ratings_of(user_id) {
            if rated.rated_at < since {
                continue;
            }
            let Some(movie) = self.get(movie_id) else {
                continue;
            };
            if movie.genres.is_empty() {
                continue;
            }
            let weight = rated.rating as f32 / MAX_RATING as f32;
            for genre in &movie.genres {
                *recent.weights.entry(*genre).or_insert(0.0) += weight;
            }
            recent.ratings += 1;
        }
        recent
    }
}
