use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    config::FusionConfig,
    error::{AppError, AppResult},
    models::{
        Affinity, Explanation, Genre, Mood, MovieFeature, MovieId, Reason,
        RecommendationContext, ScoredMovie, SignalBreakdown, UserId, MAX_RATING,
    },
    services::{
        collaborative::{CollaborativeRecommender, ModelSnapshot},
        content_based::{cosine_similarity, ContentRecommender},
        feature_store::FeatureStore,
        mood::MoodIndex,
    },
};

/// Seed movies listed in an explanation
const EXPLAIN_SEED_LIMIT: usize = 3;

/// Hybrid ranker fusing content, collaborative and mood signals
#[derive(Clone)]
pub struct FusionRanker {
    features: Arc<FeatureStore>,
    content: ContentRecommender,
    collaborative: CollaborativeRecommender,
    moods: Arc<MoodIndex>,
    config: FusionConfig,
}

impl FusionRanker {
    pub fn new(
        features: Arc<FeatureStore>,
        content: ContentRecommender,
        collaborative: CollaborativeRecommender,
        moods: Arc<MoodIndex>,
        config: FusionConfig,
    ) -> Self {
        Self {
            features,
            content,
            collaborative,
            moods,
            config,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fused top-k for the requester and any group members, against one snapshot
    ///
    /// Every member is scored individually over the shared candidate pool and
    /// the group keeps each movie's worst member score (least misery).
    pub fn rank(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        context: &RecommendationContext,
        k: usize,
    ) -> Vec<ScoredMovie> {
        let members: Vec<UserId> = context.members(user_id).into_iter().collect();
        let pool = k.saturating_mul(self.config.candidate_multiplier.max(4));
        let candidates = self.candidates(snapshot, &members, pool);

        tracing::debug!(
            user_id = %user_id,
            members = members.len(),
            candidates = candidates.len(),
            model_version = snapshot.version(),
            "Gathered fusion candidates"
        );

        if candidates.is_empty() {
            return Vec::new();
        }

        // Score per member, keep the worst, then spread genres
        let per_member: Vec<HashMap<MovieId, ScoredMovie>> = members
            .iter()
            .map(|member| self.score_for_member(snapshot, *member, &candidates, context.mood))
            .collect();

        diversify(
            aggregate_least_misery(&per_member),
            k,
            self.config.diversity_penalty,
            self.config.diversity_max_per_genre,
        )
    }

    /// Union of collaborative and content candidates, minus anything any member has seen
    fn candidates(
        &self,
        snapshot: &ModelSnapshot,
        members: &[UserId],
        pool: usize,
    ) -> Vec<Arc<MovieFeature>> {
        let mut seen: HashSet<MovieId> = HashSet::new();
        for member in members {
            seen.extend(self.features.interacted(*member));
        }

        let mut ids: BTreeSet<MovieId> = BTreeSet::new();
        for member in members {
            // Collaborative top picks plus content neighbours of liked seeds
            let ranking = self.collaborative.recommend_in(snapshot, *member, pool, &seen);
            ids.extend(ranking.items.iter().map(|(id, _)| *id));

            for (seed, _) in self.features.top_rated(*member, self.config.seed_movie_count) {
                match self.content.similar(seed, pool, &seen) {
                    Ok(similar) => ids.extend(similar.iter().map(|s| s.movie_id)),
                    Err(e) => {
                        tracing::debug!(seed_movie_id = seed, error = %e, "Skipping seed without features")
                    }
                }
            }
        }

        ids.into_iter()
            .filter_map(|id| self.features.get(id))
            .collect()
    }

    fn seeds(&self, user_id: UserId) -> Vec<(Arc<MovieFeature>, u8)> {
        self.features
            .top_rated(user_id, self.config.seed_movie_count)
            .into_iter()
            .filter_map(|(id, rating)| self.features.get(id).map(|f| (f, rating)))
            .collect()
    }

    fn score_for_member(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        candidates: &[Arc<MovieFeature>],
        mood: Option<Mood>,
    ) -> HashMap<MovieId, ScoredMovie> {
        let seeds = self.seeds(user_id);
        let user_factors = snapshot.user_factors(user_id);

        let content_raw: Vec<f32> = candidates
            .iter()
            .map(|c| content_score(&seeds, c))
            .collect();
        let affinities: Vec<Affinity> = candidates
            .iter()
            .map(|c| snapshot.affinity_with(user_factors.as_deref(), c.movie_id))
            .collect();

        // Min-max only over trained pairs; cold pairs never stretch the range.
        let predicted: Vec<f32> = affinities
            .iter()
            .filter_map(|a| match a {
                Affinity::Predicted(v) => Some(*v),
                Affinity::ColdStart { .. } => None,
            })
            .collect();
        let mut predicted_norm = normalize(&predicted).into_iter();

        let popularity_raw: Vec<f32> = candidates.iter().map(|c| c.popularity as f32).collect();
        let content = normalize(&content_raw);
        let popularity_norm = normalize(&popularity_raw);

        // Cold movies beside trained ones stand in with discounted popularity.
        let stand_in = if predicted.is_empty() {
            1.0
        } else {
            self.config.cold_movie_discount
        };

        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let (collaborative, popularity) = match affinities[i] {
                    Affinity::Predicted(_) => (predicted_norm.next(), None),
                    Affinity::ColdStart { .. } => (None, Some(popularity_norm[i] * stand_in)),
                };
                let alignment = mood.and_then(|m| self.moods.alignment(c.movie_id, m));
                let score = self.config.weight_content * content[i]
                    + self.config.weight_collaborative
                        * collaborative.or(popularity).unwrap_or(0.0)
                    + self.config.weight_mood * alignment.unwrap_or(0.0);

                let scored = ScoredMovie {
                    movie_id: c.movie_id,
                    score,
                    primary_genre: c.primary_genre(),
                    popularity: c.popularity,
                    breakdown: SignalBreakdown {
                        content: content[i],
                        collaborative,
                        popularity,
                        mood: alignment,
                        diversity_multiplier: 1.0,
                    },
                };
                (c.movie_id, scored)
            })
            .collect()
    }

    /// Reasons `movie_id` would be recommended to `user_id`
    pub fn explain(
        &self,
        snapshot: &ModelSnapshot,
        user_id: UserId,
        movie_id: MovieId,
        mood: Option<Mood>,
    ) -> AppResult<Explanation> {
        let movie = self
            .features
            .get(movie_id)
            .ok_or_else(|| AppError::NotFound(format!("movie {} has no features", movie_id)))?;

        let mut similar: Vec<(Arc<MovieFeature>, u8, f32)> = self
            .seeds(user_id)
            .into_iter()
            .filter(|(seed, _)| seed.movie_id != movie_id)
            .map(|(seed, rating)| {
                let similarity = cosine_similarity(&seed.embedding, &movie.embedding);
                (seed, rating, similarity)
            })
            .filter(|(_, _, similarity)| *similarity > 0.0)
            .collect();
        similar.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.movie_id.cmp(&b.0.movie_id)));

        let mut reasons: Vec<Reason> = similar
            .into_iter()
            .take(EXPLAIN_SEED_LIMIT)
            .map(|(seed, rating, similarity)| Reason::SimilarTo {
                seed_movie_id: seed.movie_id,
                seed_rating: rating,
                similarity,
                shared_genres: seed.shared_genres(&movie),
            })
            .collect();

        reasons.push(match snapshot.affinity(user_id, movie_id) {
            Affinity::Predicted(score) => Reason::PredictedAffinity { score },
            Affinity::ColdStart { fallback } => Reason::ColdStart {
                global_mean: fallback,
            },
        });

        let mood_match = match mood {
            Some(m) => self.moods.alignment(movie_id, m).map(|p| (m, p)),
            None => {
                let outcome = self.moods.get(movie_id);
                if outcome.is_informative() {
                    outcome.vector().dominant()
                } else {
                    None
                }
            }
        };
        if let Some((mood, probability)) = mood_match {
            reasons.push(Reason::MoodMatch { mood, probability });
        }

        reasons.push(Reason::Popular {
            popularity: movie.popularity,
        });

        Ok(Explanation {
            user_id,
            movie_id,
            model_version: snapshot.version(),
            reasons,
        })
    }
}

/// Best seed similarity, weighted by how much the user liked the seed
fn content_score(seeds: &[(Arc<MovieFeature>, u8)], candidate: &MovieFeature) -> f32 {
    seeds
        .iter()
        .map(|(seed, rating)| {
            cosine_similarity(&seed.embedding, &candidate.embedding) * (*rating as f32 / MAX_RATING as f32)
        })
        .fold(0.0, f32::max)
}

/// Min-max scaling onto [0, 1] within one candidate set
///
/// A constant signal carries no ranking information: it maps to 1.0 when
/// present (positive) and 0.0 otherwise.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range.is_nan() || range <= f32::EPSILON {
        return values
            .iter()
            .map(|v| if *v > 0.0 { 1.0 } else { 0.0 })
            .collect();
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Per-movie minimum across members; the breakdown shown is the unhappiest member's
pub fn aggregate_least_misery(per_member: &[HashMap<MovieId, ScoredMovie>]) -> Vec<ScoredMovie> {
    let Some((first, rest)) = per_member.split_first() else {
        return Vec::new();
    };

    first
        .values()
        .filter_map(|candidate| {
            let mut worst = candidate;
            for member in rest {
                let other = member.get(&candidate.movie_id)?;
                if other.score < worst.score {
                    worst = other;
                }
            }
            Some(worst.clone())
        })
        .collect()
}

/// Ranking order: score desc, popularity desc, movie id asc
fn rank_cmp(a_score: f32, a: &ScoredMovie, b_score: f32, b: &ScoredMovie) -> Ordering {
    b_score
        .total_cmp(&a_score)
        .then(b.popularity.total_cmp(&a.popularity))
        .then(a.movie_id.cmp(&b.movie_id))
}

/// Greedy top-k selection with a primary-genre penalty, then the final sort
///
/// Once `max_per_genre` picks share a primary genre, later candidates of that
/// genre compete at `score * penalty`. The penalty does not compound.
pub fn diversify(
    mut candidates: Vec<ScoredMovie>,
    k: usize,
    penalty: f32,
    max_per_genre: usize,
) -> Vec<ScoredMovie> {
    let mut selected: Vec<ScoredMovie> = Vec::with_capacity(k.min(candidates.len()));
    let mut genre_counts: HashMap<Genre, usize> = HashMap::new();

    while selected.len() < k && !candidates.is_empty() {
        let multiplier = |movie: &ScoredMovie| match movie.primary_genre {
            Some(genre) if genre_counts.get(&genre).copied().unwrap_or(0) >= max_per_genre => {
                penalty
            }
            _ => 1.0,
        };

        let best = candidates
            .iter()
            .enumerate()
            .min_by(|&(_, a), &(_, b)| {
                rank_cmp(a.score * multiplier(a), a, b.score * multiplier(b), b)
            })
            .map(|(i, _)| i);
        let Some(best) = best else {
            break;
        };

        let mut pick = candidates.swap_remove(best);
        let applied = multiplier(&pick);
        pick.score *= applied;
        pick.breakdown.diversity_multiplier = applied;
        if let Some(genre) = pick.primary_genre {
            *genre_counts.entry(genre).or_insert(0) += 1;
        }
        selected.push(pick);
    }

    selected.sort_by(|a, b| rank_cmp(a.score, a, b.score, b));
    selected
}
