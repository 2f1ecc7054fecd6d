use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::Persistence;
use crate::error::AppResult;
use crate::models::{InteractionEvent, ModelArtifact, MovieFeature};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// List of JSON-encoded interaction events, in append order
    EventLog,
    /// JSON-encoded artifact of the served model
    CurrentModel,
    /// Hash of movie id to JSON-encoded feature
    FeatureCatalog,
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::EventLog => write!(f, "events:log"),
            StoreKey::CurrentModel => write!(f, "model:current"),
            StoreKey::FeatureCatalog => write!(f, "features:catalog"),
        }
    }
}

/// Creates a Redis client for the persistence store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

enum WriteOp {
    Set(String),
    HashSet { field: String, value: String },
}

/// Message for asynchronous store writes
struct WriteMessage {
    key: StoreKey,
    op: WriteOp,
}

/// Redis-backed persistence
///
/// Event appends are written inline so a failure reaches the caller. Model and
/// feature snapshots are large and only read back at startup, so they go
/// through a background writer.
#[derive(Clone)]
pub struct RedisStore {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<WriteMessage>,
}

/// Handle for gracefully shutting down the store writer
pub struct StoreWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl StoreWriterHandle {
    /// Signals the writer task and waits until queued writes are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Store writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Store writer task failed during shutdown");
        }
    }
}

impl RedisStore {
    /// Creates a new store with its background writer task
    pub async fn new(redis_client: Client) -> (Self, StoreWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let task = tokio::spawn(async move {
            Self::writer_task(client, write_rx, shutdown_rx).await;
        });

        let store = Self {
            redis_client,
            write_tx,
        };

        (store, StoreWriterHandle { shutdown_tx, task })
    }

    /// Background task draining queued writes into Redis
    ///
    /// On shutdown, writes already queued are flushed before the task exits.
    async fn writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<WriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Store writer task started");

        loop {
            tokio::select! {
                // Queued catalog or model write
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis store");
                    }
                }
                // Shutdown: drain what is already queued, then stop
                _ = shutdown_rx.recv() => {
                    let mut flushed = 0usize;
                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush store write during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed, "Store writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: WriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let key = msg.key.to_string();
        match msg.op {
            WriteOp::Set(value) => {
                let _: () = conn.set(key, value).await?;
            }
            WriteOp::HashSet { field, value } => {
                let _: () = conn.hset(key, field, value).await?;
            }
        }
        Ok(())
    }

    fn enqueue(&self, key: StoreKey, op: WriteOp) {
        if let Err(e) = self.write_tx.send(WriteMessage { key, op }) {
            tracing::error!(error = %e, "Failed to send store write message");
        }
    }
}

#[async_trait]
impl Persistence for RedisStore {
    async fn append_event(&self, event: &InteractionEvent) -> AppResult<()> {
        let json = serde_json::to_string(event)?;
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.rpush(StoreKey::EventLog.to_string(), json).await?;
        Ok(())
    }

    async fn load_events(&self) -> AppResult<Vec<InteractionEvent>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn.lrange(StoreKey::EventLog.to_string(), 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }

    async fn save_model(&self, artifact: &ModelArtifact) -> AppResult<()> {
        let json = serde_json::to_string(artifact)?;
        self.enqueue(StoreKey::CurrentModel, WriteOp::Set(json));
        Ok(())
    }

    async fn load_model(&self) -> AppResult<Option<ModelArtifact>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(StoreKey::CurrentModel.to_string()).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_feature(&self, feature: &MovieFeature) -> AppResult<()> {
        let json = serde_json::to_string(feature)?;
        self.enqueue(
            StoreKey::FeatureCatalog,
            WriteOp::HashSet {
                field: feature.movie_id.to_string(),
                value: json,
            },
        );
        Ok(())
    }

    async fn load_features(&self) -> AppResult<Vec<MovieFeature>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn.hvals(StoreKey::FeatureCatalog.to_string()).await?;
        let mut features: Vec<MovieFeature> = raw
            .iter()
            .map(|json| serde_json::from_str(json))
            .collect::<Result<_, _>>()?;
        features.sort_by_key(|f| f.movie_id);
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_display_event_log() {
        assert_eq!(format!("{}", StoreKey::EventLog), "events:log");
    }

    #[test]
    fn test_store_key_display_current_model() {
        assert_eq!(format!("{}", StoreKey::CurrentModel), "model:current");
    }

    #[test]
    fn test_store_key_display_feature_catalog() {
        assert_eq!(format!("{}", StoreKey::FeatureCatalog), "features:catalog");
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_model_written_in_background_survives_shutdown() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        let (store, handle) = RedisStore::new(client.clone()).await;

        let artifact = ModelArtifact {
            version: 3,
            latent_dim: 2,
            global_mean: 3.5,
            trained_at: chrono::Utc::now(),
            trained_through: 0,
            users: Vec::new(),
            movies: Vec::new(),
        };
        store.save_model(&artifact).await.unwrap();
        handle.shutdown().await;

        let loaded = store.load_model().await.unwrap().unwrap();
        assert_eq!(loaded.version, 3);

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(StoreKey::CurrentModel.to_string()).await.unwrap();
    }
}
