use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{InteractionEvent, ModelArtifact, MovieFeature},
};

pub mod cache;
pub mod memory;
pub mod redis;

pub use cache::{CacheKey, Lookup, RecommendationCache};
pub use memory::MemoryStore;
pub use redis::{create_redis_client, RedisStore, StoreKey, StoreWriterHandle};

/// Durable storage for the feedback log, trained models and the feature catalog
///
/// Read-your-writes per key. The engine only reads back at startup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Appends one accepted event to the log; must be durable before returning
    async fn append_event(&self, event: &InteractionEvent) -> AppResult<()>;

    /// Whole log in append order
    async fn load_events(&self) -> AppResult<Vec<InteractionEvent>>;

    async fn save_model(&self, artifact: &ModelArtifact) -> AppResult<()>;

    async fn load_model(&self) -> AppResult<Option<ModelArtifact>>;

    async fn save_feature(&self, feature: &MovieFeature) -> AppResult<()>;

    async fn load_features(&self) -> AppResult<Vec<MovieFeature>>;
}
