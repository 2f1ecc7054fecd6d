use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Redis connection URL. When unset the engine keeps its log and models in memory.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Optional JSON file with the initial movie feature catalog
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Content embedding dimension (D)
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Latent factor dimension (K)
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,

    #[serde(default = "default_weight_content")]
    pub weight_content: f32,

    #[serde(default = "default_weight_collaborative")]
    pub weight_collaborative: f32,

    #[serde(default = "default_weight_mood")]
    pub weight_mood: f32,

    /// Multiplicative penalty for over-represented primary genres
    #[serde(default = "default_diversity_penalty")]
    pub diversity_penalty: f32,

    /// Number of same-genre picks allowed before the penalty applies
    #[serde(default = "default_diversity_max_per_genre")]
    pub diversity_max_per_genre: usize,

    /// Weight of the popularity stand-in for movies the served model has no factors for
    #[serde(default = "default_cold_movie_discount")]
    pub cold_movie_discount: f32,

    /// Candidate pool size per base recommender, as a multiple of k
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Number of top-rated movies used to seed content candidates
    #[serde(default = "default_seed_movie_count")]
    pub seed_movie_count: usize,

    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    /// Recommendation cache validity window in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Cache inserts between sweeps of expired entries (0 disables)
    #[serde(default = "default_cache_sweep_every")]
    pub cache_sweep_every: u64,

    /// Days of ratings used to infer a mood when a request names none (0 disables)
    #[serde(default = "default_mood_inference_days")]
    pub mood_inference_days: u64,

    /// Minimum reviews before a mood distribution is considered informative
    #[serde(default = "default_min_review_count")]
    pub min_review_count: usize,

    #[serde(default = "default_train_epochs")]
    pub train_epochs: usize,

    #[serde(default = "default_train_learning_rate")]
    pub train_learning_rate: f32,

    #[serde(default = "default_train_regularization")]
    pub train_regularization: f32,

    /// Training weight of watch/click events relative to explicit ratings
    #[serde(default = "default_implicit_weight")]
    pub implicit_weight: f32,

    /// Rating value an implicit positive event stands in for
    #[serde(default = "default_implicit_rating")]
    pub implicit_rating: f32,

    /// Learning rate of the per-event incremental nudge
    #[serde(default = "default_online_learning_rate")]
    pub online_learning_rate: f32,

    #[serde(default = "default_train_seed")]
    pub train_seed: u64,

    /// Accepted events between background retrains (0 disables)
    #[serde(default = "default_retrain_every_events")]
    pub retrain_every_events: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_embedding_dim() -> usize {
    32
}

fn default_latent_dim() -> usize {
    16
}

fn default_weight_content() -> f32 {
    0.3
}

fn default_weight_collaborative() -> f32 {
    0.5
}

fn default_weight_mood() -> f32 {
    0.2
}

fn default_diversity_penalty() -> f32 {
    0.85
}

fn default_diversity_max_per_genre() -> usize {
    2
}

fn default_cold_movie_discount() -> f32 {
    0.5
}

fn default_candidate_multiplier() -> usize {
    4
}

fn default_seed_movie_count() -> usize {
    5
}

fn default_max_recommendations() -> usize {
    50
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_cache_sweep_every() -> u64 {
    256
}

fn default_mood_inference_days() -> u64 {
    7
}

fn default_min_review_count() -> usize {
    3
}

fn default_train_epochs() -> usize {
    30
}

fn default_train_learning_rate() -> f32 {
    0.01
}

fn default_train_regularization() -> f32 {
    0.05
}

fn default_implicit_weight() -> f32 {
    0.3
}

fn default_implicit_rating() -> f32 {
    4.0
}

fn default_online_learning_rate() -> f32 {
    0.005
}

fn default_train_seed() -> u64 {
    42
}

fn default_retrain_every_events() -> u64 {
    500
}

/// Fusion policy parameters
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub weight_content: f32,
    pub weight_collaborative: f32,
    pub weight_mood: f32,
    pub diversity_penalty: f32,
    pub diversity_max_per_genre: usize,
    pub cold_movie_discount: f32,
    pub candidate_multiplier: usize,
    pub seed_movie_count: usize,
    pub max_recommendations: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weight_content: default_weight_content(),
            weight_collaborative: default_weight_collaborative(),
            weight_mood: default_weight_mood(),
            diversity_penalty: default_diversity_penalty(),
            diversity_max_per_genre: default_diversity_max_per_genre(),
            cold_movie_discount: default_cold_movie_discount(),
            candidate_multiplier: default_candidate_multiplier(),
            seed_movie_count: default_seed_movie_count(),
            max_recommendations: default_max_recommendations(),
        }
    }
}

/// Matrix factorization parameters for batch training and online nudges
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub latent_dim: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub regularization: f32,
    pub implicit_weight: f32,
    pub implicit_rating: f32,
    pub online_learning_rate: f32,
    pub seed: u64,
    pub retrain_every_events: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            latent_dim: default_latent_dim(),
            epochs: default_train_epochs(),
            learning_rate: default_train_learning_rate(),
            regularization: default_train_regularization(),
            implicit_weight: default_implicit_weight(),
            implicit_rating: default_implicit_rating(),
            online_learning_rate: default_online_learning_rate(),
            seed: default_train_seed(),
            retrain_every_events: default_retrain_every_events(),
        }
    }
}

/// Full set of engine parameters, independent of the HTTP and storage settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub embedding_dim: usize,
    pub fusion: FusionConfig,
    pub training: TrainingConfig,
    pub cache_ttl: Duration,
    pub cache_sweep_every: u64,
    /// 0 disables mood inference
    pub mood_inference_days: u64,
    pub min_review_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            fusion: FusionConfig::default(),
            training: TrainingConfig::default(),
            cache_ttl: Duration::from_secs(default_cache_ttl_secs()),
            cache_sweep_every: default_cache_sweep_every(),
            mood_inference_days: default_mood_inference_days(),
            min_review_count: default_min_review_count(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Engine parameters derived from the flat environment settings
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            embedding_dim: self.embedding_dim,
            fusion: FusionConfig {
                weight_content: self.weight_content,
                weight_collaborative: self.weight_collaborative,
                weight_mood: self.weight_mood,
                diversity_penalty: self.diversity_penalty,
                diversity_max_per_genre: self.diversity_max_per_genre,
                cold_movie_discount: self.cold_movie_discount.clamp(0.0, 1.0),
                candidate_multiplier: self.candidate_multiplier.max(4),
                seed_movie_count: self.seed_movie_count,
                max_recommendations: self.max_recommendations.max(1),
            },
            training: TrainingConfig {
                latent_dim: self.latent_dim,
                epochs: self.train_epochs,
                learning_rate: self.train_learning_rate,
                regularization: self.train_regularization,
                implicit_weight: self.implicit_weight,
                implicit_rating: self.implicit_rating,
                online_learning_rate: self.online_learning_rate,
                seed: self.train_seed,
                retrain_every_events: self.retrain_every_events,
            },
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_sweep_every: self.cache_sweep_every,
            mood_inference_days: self.mood_inference_days,
            min_review_count: self.min_review_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.redis_url.is_none());

        let engine = config.engine();
        assert_eq!(engine.fusion.weight_content, 0.3);
        assert_eq!(engine.fusion.weight_collaborative, 0.5);
        assert_eq!(engine.fusion.weight_mood, 0.2);
        assert_eq!(engine.fusion.diversity_penalty, 0.85);
        assert_eq!(engine.cache_ttl, Duration::from_secs(900));
        assert_eq!(engine.fusion.cold_movie_discount, 0.5);
        assert_eq!(engine.mood_inference_days, 7);
    }

    #[test]
    fn test_candidate_multiplier_never_below_four() {
        let config: Config = envy::from_iter(vec![(
            "CANDIDATE_MULTIPLIER".to_string(),
            "2".to_string(),
        )])
        .unwrap();
        assert_eq!(config.engine().fusion.candidate_multiplier, 4);
    }

    #[test]
    fn test_weights_override() {
        let config: Config = envy::from_iter(vec![
            ("WEIGHT_CONTENT".to_string(), "0.6".to_string()),
            ("WEIGHT_MOOD".to_string(), "0.0".to_string()),
        ])
        .unwrap();
        let fusion = config.engine().fusion;
        assert_eq!(fusion.weight_content, 0.6);
        assert_eq!(fusion.weight_mood, 0.0);
        assert_eq!(fusion.weight_collaborative, 0.5);
    }
}
