use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::{MemoryStore, Persistence};
use crate::services::{LexiconClassifier, RecommendationEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
}

impl AppState {
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }

    /// State over a fresh engine with in-memory persistence and the lexicon mood classifier
    pub fn in_memory(config: EngineConfig) -> Self {
        let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
        Self::new(Arc::new(RecommendationEngine::new(
            config,
            store,
            Arc::new(LexiconClassifier::default()),
        )))
    }
}
