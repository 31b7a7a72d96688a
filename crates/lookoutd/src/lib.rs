//! LookOut daemon library - exposes modules for testing.

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod frames;
pub mod llm;
pub mod pipeline;
pub mod reasoner;
pub mod retry;
pub mod routes;
pub mod routing;
pub mod server;
pub mod store;
pub mod testing;
pub mod vector;

use anyhow::Result;
use lookout_shared::EMBEDDING_DIM;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use classifier::HttpClassifier;
use config::LookoutConfig;
use embedding::{Embedder, EmbeddingProvider, HashingEmbeddingProvider, HttpEmbeddingProvider};
use frames::FrameArchive;
use pipeline::Pipeline;
use reasoner::{CliReasoner, DecisionEngine};
use retry::RetryPolicy;
use routing::{OsrmClient, RoutePlanner};
use store::IncidentStore;
use vector::{HttpVectorIndex, VectorIndex, VectorStore};

/// Wire every collaborator from configuration. The vector store is returned
/// uninitialized; call `initialize` before serving.
pub async fn build_pipeline(config: &LookoutConfig) -> Result<Pipeline> {
    let store = IncidentStore::open(&config.storage.db_path).await?;

    let embedding_provider: Arc<dyn EmbeddingProvider> = match &config.embedding.endpoint {
        Some(url) => {
            info!("Embeddings via {}", url);
            Arc::new(HttpEmbeddingProvider::new(
                url,
                &config.embedding.model,
                Duration::from_secs(config.embedding.timeout_secs),
            )?)
        }
        None => {
            info!("No embedding endpoint configured, using local feature hashing");
            Arc::new(HashingEmbeddingProvider::new(EMBEDDING_DIM))
        }
    };
    let embedder = Embedder::new(
        embedding_provider,
        EMBEDDING_DIM,
        config.embedding.cache_capacity,
    );

    let index: Option<Arc<dyn VectorIndex>> = match &config.vector.endpoint {
        Some(url) => Some(Arc::new(HttpVectorIndex::new(
            url,
            Duration::from_secs(config.vector.timeout_secs),
        )?)),
        None => None,
    };
    let vectors = Arc::new(VectorStore::new(
        index,
        config.vector.collection.clone(),
        EMBEDDING_DIM,
        RetryPolicy::new(
            config.vector.max_attempts,
            Duration::from_secs(config.vector.base_delay_secs),
        ),
    ));

    let decisions = if config.reasoner.enabled {
        info!("Reasoner enabled: {}", config.reasoner.command);
        DecisionEngine::new(Some(Arc::new(CliReasoner::new(
            &config.reasoner.command,
            Duration::from_secs(config.reasoner.timeout_secs),
            config.reasoner.workers,
        ))))
    } else {
        info!("Reasoner disabled, decisions come from the rule table");
        DecisionEngine::rules_only()
    };

    let osrm = OsrmClient::new(
        &config.routing.base_url,
        config.routing.timeout(),
        Duration::from_millis(config.routing.rate_limit_retry_ms),
    )?;
    let planner = RoutePlanner::new(
        Arc::new(osrm),
        Duration::from_millis(config.routing.pacing_ms),
    );

    let mut pipeline = Pipeline::new(store, vectors, planner)
        .with_embedder(embedder)
        .with_decisions(decisions)
        .with_frames(FrameArchive::new(config.storage.frames_dir.clone()))
        .with_top_k(config.vector.top_k)
        .with_detour_span(config.routing.detour_span_deg);

    match &config.classifier.endpoint {
        Some(url) => {
            info!("Classifier: {} via {}", config.classifier.model, url);
            pipeline = pipeline.with_classifier(Arc::new(HttpClassifier::new(
                url,
                &config.classifier.model,
                Duration::from_secs(config.classifier.timeout_secs),
            )?));
        }
        None => info!("No classifier endpoint configured, using filename heuristics"),
    }

    Ok(pipeline)
}
