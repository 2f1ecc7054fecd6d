use anyhow::Context;
use std::sync::Arc;
use tokio::signal;

use cinematch_engine::api::{create_router, AppState};
use cinematch_engine::config::Config;
use cinematch_engine::db::{create_redis_client, MemoryStore, Persistence, RedisStore};
use cinematch_engine::models::MovieFeature;
use cinematch_engine::services::{LexiconClassifier, RecommendationEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let (store, writer): (Arc<dyn Persistence>, _) = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url)?;
            let (store, handle) = RedisStore::new(client).await;
            tracing::info!("Using Redis persistence");
            let store: Arc<dyn Persistence> = Arc::new(store);
            (store, Some(handle))
        }
        None => {
            tracing::info!("No REDIS_URL set, using in-memory persistence");
            let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    let engine = Arc::new(RecommendationEngine::new(
        config.engine(),
        store,
        Arc::new(LexiconClassifier::default()),
    ));
    engine.restore().await.context("Failed to restore engine state")?;

    if let Some(path) = &config.catalog_path {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let catalog: Vec<MovieFeature> =
            serde_json::from_str(&raw).context("Failed to parse catalog")?;
        let loaded = engine.load_catalog(catalog).await?;
        tracing::info!(loaded, path = %path.display(), "Catalog loaded");
    }

    let app = create_router(AppState::new(engine));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(writer) = writer {
        writer.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
