use chrono::Utc;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::TrainingConfig,
    models::{
        EventKind, InteractionEvent, ModelArtifact, MovieId, MovieLatentProfile, UserId,
        UserLatentProfile,
    },
};

const INIT_SCALE: f32 = 0.1;

/// One training observation for a (user, movie) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub target: f32,
    pub weight: f32,
}

/// Target value and loss weight contributed by one event
pub fn observation_for(kind: &EventKind, config: &TrainingConfig) -> (f32, f32) {
    match kind {
        EventKind::Rating { value } => (*value as f32, 1.0),
        EventKind::Watch | EventKind::Click => (config.implicit_rating, config.implicit_weight),
    }
}

/// Collapses the log into one observation per pair
///
/// The latest explicit rating wins; implicit events count only for pairs the
/// user never rated, and only as positive signals.
pub fn collect_observations(
    events: &[InteractionEvent],
    config: &TrainingConfig,
) -> Vec<Observation> {
    let mut explicit: BTreeMap<(UserId, MovieId), (u64, f32)> = BTreeMap::new();
    let mut implicit: BTreeSet<(UserId, MovieId)> = BTreeSet::new();

    for event in events {
        let key = (event.user_id, event.movie_id);
        match event.kind.rating() {
            Some(value) => {
                let newer = explicit
                    .get(&key)
                    .map_or(true, |(seq, _)| *seq <= event.sequence);
                if newer {
                    explicit.insert(key, (event.sequence, value as f32));
                }
            }
            None => {
                implicit.insert(key);
            }
        }
    }

    let mut observations: Vec<Observation> = explicit
        .iter()
        .map(|((user_id, movie_id), (_, rating))| Observation {
            user_id: *user_id,
            movie_id: *movie_id,
            target: *rating,
            weight: 1.0,
        })
        .collect();

    observations.extend(
        implicit
            .into_iter()
            .filter(|key| !explicit.contains_key(key))
            .map(|(user_id, movie_id)| {
                let (target, weight) = observation_for(&EventKind::Watch, config);
                Observation {
                    user_id,
                    movie_id,
                    target,
                    weight,
                }
            }),
    );

    observations
}

/// Batch-trains a biased matrix factorization on the full log
///
/// Minimizes weighted squared error of `mean + item_bias + p_u . q_i` with L2
/// regularization on both factor matrices and the item biases. Deterministic
/// for a given log and seed.
pub fn train(events: &[InteractionEvent], config: &TrainingConfig, version: u64) -> ModelArtifact {
    let observations = collect_observations(events, config);
    let trained_through = events.iter().map(|e| e.sequence + 1).max().unwrap_or(0);
    let dim = config.latent_dim;

    let total_weight: f32 = observations.iter().map(|o| o.weight).sum();
    let global_mean = if total_weight > 0.0 {
        observations.iter().map(|o| o.target * o.weight).sum::<f32>() / total_weight
    } else {
        3.0
    };

    let mut rng = StdRng::seed_from_u64(config.seed);

    let user_ids: BTreeSet<UserId> = observations.iter().map(|o| o.user_id).collect();
    let movie_ids: BTreeSet<MovieId> = observations.iter().map(|o| o.movie_id).collect();

    let mut users: BTreeMap<UserId, Vec<f32>> = user_ids
        .into_iter()
        .map(|id| (id, random_factors(&mut rng, dim)))
        .collect();
    let mut movies: BTreeMap<MovieId, (Vec<f32>, f32)> = movie_ids
        .into_iter()
        .map(|id| (id, (random_factors(&mut rng, dim), 0.0)))
        .collect();

    let lr = config.learning_rate;
    let reg = config.regularization;
    let mut order: Vec<usize> = (0..observations.len()).collect();

    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);
        let mut loss = 0.0f32;

        for &idx in &order {
            let obs = observations[idx];
            let (Some(p), Some((q, bias))) =
                (users.get_mut(&obs.user_id), movies.get_mut(&obs.movie_id))
            else {
                continue;
            };

            let dot: f32 = p.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
            let residual = obs.target - (global_mean + *bias + dot);
            loss += obs.weight * residual * residual;
            let gradient = obs.weight * residual;

            *bias += lr * (gradient - reg * *bias);
            for f in 0..dim {
                let pf = p[f];
                let qf = q[f];
                p[f] += lr * (gradient * qf - reg * pf);
                q[f] += lr * (gradient * pf - reg * qf);
            }
        }

        tracing::debug!(
            epoch,
            loss = loss / observations.len().max(1) as f32,
            "Factorization epoch complete"
        );
    }

    let now = Utc::now();
    ModelArtifact {
        version,
        latent_dim: dim,
        global_mean,
        trained_at: now,
        trained_through,
        users: users
            .into_iter()
            .map(|(user_id, factors)| UserLatentProfile {
                user_id,
                factors,
                updated_at: now,
                update_count: 0,
            })
            .collect(),
        movies: movies
            .into_iter()
            .map(|(movie_id, (factors, bias))| MovieLatentProfile {
                movie_id,
                factors,
                bias,
                updated_at: now,
                update_count: 0,
            })
            .collect(),
    }
}

fn random_factors(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|_| rng.gen_range(-INIT_SCALE..INIT_SCALE))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::collaborative::snapshot::ModelSnapshot;
    use uuid::Uuid;

    fn event(seq: u64, user: UserId, movie: MovieId, kind: EventKind) -> InteractionEvent {
        InteractionEvent {
            event_id: Uuid::new_v4(),
            sequence: seq,
            user_id: user,
            movie_id: movie,
            kind,
            timestamp: Utc::now(),
        }
    }

    fn rating(value: u8) -> EventKind {
        EventKind::Rating { value }
    }

    #[test]
    fn test_latest_rating_wins_and_implicit_is_weighted_lower() {
        let config = TrainingConfig::default();
        let user = Uuid::new_v4();
        let events = vec![
            event(0, user, 1, rating(2)),
            event(1, user, 1, rating(5)),
            event(2, user, 1, EventKind::Watch),
            event(3, user, 2, EventKind::Click),
        ];

        let obs = collect_observations(&events, &config);
        assert_eq!(obs.len(), 2);
        let rated = obs.iter().find(|o| o.movie_id == 1).unwrap();
        assert_eq!((rated.target, rated.weight), (5.0, 1.0));
        let clicked = obs.iter().find(|o| o.movie_id == 2).unwrap();
        assert_eq!(clicked.weight, 0.3);
        assert_eq!(clicked.target, config.implicit_rating);
    }

    #[test]
    fn test_training_is_deterministic() {
        let config = TrainingConfig {
            latent_dim: 4,
            epochs: 10,
            ..TrainingConfig::default()
        };
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let events = vec![
            event(0, a, 1, rating(5)),
            event(1, a, 2, rating(1)),
            event(2, b, 1, rating(4)),
            event(3, b, 3, EventKind::Watch),
        ];

        let first = train(&events, &config, 1);
        let second = train(&events, &config, 1);
        let factors = |a: &ModelArtifact| -> Vec<Vec<f32>> {
            a.users.iter().map(|u| u.factors.clone()).collect()
        };
        assert_eq!(factors(&first), factors(&second));
        assert_eq!(first.global_mean, second.global_mean);
        assert_eq!(first.trained_through, 4);
        assert_eq!(first.users.len(), 2);
        assert_eq!(first.movies.len(), 3);
    }

    #[test]
    fn test_training_separates_liked_from_disliked() {
        let config = TrainingConfig {
            latent_dim: 4,
            epochs: 200,
            learning_rate: 0.02,
            ..TrainingConfig::default()
        };
        let users: Vec<UserId> = (0..6).map(|_| Uuid::new_v4()).collect();
        let mut events = Vec::new();
        let mut seq = 0;
        for user in &users {
            events.push(event(seq, *user, 100, rating(5)));
            events.push(event(seq + 1, *user, 200, rating(1)));
            seq += 2;
        }

        let snapshot = ModelSnapshot::from_artifact(train(&events, &config, 1));
        let loved = snapshot.affinity(users[0], 100).value();
        let hated = snapshot.affinity(users[0], 200).value();
        assert!(loved > 4.0, "loved = {}", loved);
        assert!(hated < 2.0, "hated = {}", hated);
    }

    #[test]
    fn test_empty_log_trains_empty_model() {
        let artifact = train(&[], &TrainingConfig::default(), 1);
        assert!(artifact.users.is_empty());
        assert_eq!(artifact.global_mean, 3.0);
        assert_eq!(artifact.trained_through, 0);
    }
}
