use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::Persistence;
use crate::{
    error::AppResult,
    models::{InteractionEvent, ModelArtifact, MovieFeature, MovieId},
};

/// In-process store used when no Redis URL is configured
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<InteractionEvent>>,
    model: RwLock<Option<ModelArtifact>>,
    features: RwLock<BTreeMap<MovieId, MovieFeature>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn append_event(&self, event: &InteractionEvent) -> AppResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn load_events(&self) -> AppResult<Vec<InteractionEvent>> {
        Ok(self.events.read().await.clone())
    }

    async fn save_model(&self, artifact: &ModelArtifact) -> AppResult<()> {
        *self.model.write().await = Some(artifact.clone());
        Ok(())
    }

    async fn load_model(&self) -> AppResult<Option<ModelArtifact>> {
        Ok(self.model.read().await.clone())
    }

    async fn save_feature(&self, feature: &MovieFeature) -> AppResult<()> {
        self.features
            .write()
            .await
            .insert(feature.movie_id, feature.clone());
        Ok(())
    }

    async fn load_features(&self) -> AppResult<Vec<MovieFeature>> {
        Ok(self.features.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, Genre};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_events_load_in_append_order() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for (sequence, movie_id) in [(0, 5), (1, 3)] {
            store
                .append_event(&InteractionEvent {
                    event_id: Uuid::new_v4(),
                    sequence,
                    user_id: user,
                    movie_id,
                    kind: EventKind::Click,
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        let movies: Vec<MovieId> = store
            .load_events()
            .await
            .unwrap()
            .iter()
            .map(|e| e.movie_id)
            .collect();
        assert_eq!(movies, vec![5, 3]);
    }

    #[tokio::test]
    async fn test_feature_save_replaces_by_id() {
        let store = MemoryStore::new();
        let mut feature = MovieFeature {
            movie_id: 1,
            embedding: vec![0.1, 0.2],
            genres: vec![Genre::Drama],
            keywords: Default::default(),
            release_epoch: 0,
            popularity: 1.0,
        };
        store.save_feature(&feature).await.unwrap();
        feature.popularity = 2.0;
        store.save_feature(&feature).await.unwrap();

        let loaded = store.load_features().await.unwrap();
        assert_eq!(loaded, vec![feature]);
        assert!(store.load_model().await.unwrap().is_none());
    }
}
