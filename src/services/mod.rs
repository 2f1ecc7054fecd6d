pub mod collaborative;
pub mod content_based;
pub mod engine;
pub mod feature_store;
pub mod feedback;
pub mod fusion;
pub mod mood;

pub use collaborative::{CollaborativeRecommender, ModelHandle, ModelSnapshot};
pub use content_based::ContentRecommender;
pub use engine::RecommendationEngine;
pub use feature_store::FeatureStore;
pub use feedback::FeedbackIngestor;
pub use fusion::FusionRanker;
pub use mood::{LexiconClassifier, MoodClassifier, MoodIndex, MoodScorer};
