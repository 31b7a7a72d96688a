//! Vector similarity store.
//!
//! Dual-mode: an external vector index when one is configured and reachable
//! at startup, an in-process index otherwise. Availability is decided once
//! by `initialize`; after that each call tries the external path (when
//! available) and degrades to the in-process index for that call only.
//! `upsert` and `search` never fail.

pub mod client;
pub mod memory;

pub use client::HttpVectorIndex;
pub use memory::{cosine_similarity, MemoryIndex};

use async_trait::async_trait;
use lookout_shared::{MatchMetadata, Result, SimilarityMatch, VectorBackend};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::retry::RetryPolicy;

/// Similarity metric for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "Cosine",
        }
    }
}

/// Contract the store needs from an external vector database.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<()>;

    async fn upsert(
        &self,
        collection: &str,
        id: i64,
        vector: &[f32],
        payload: &MatchMetadata,
    ) -> Result<()>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityMatch>>;
}

/// Search hits plus the backend that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub matches: Vec<SimilarityMatch>,
    pub backend: VectorBackend,
}

pub struct VectorStore {
    index: Option<Arc<dyn VectorIndex>>,
    collection: String,
    dimension: usize,
    retry: RetryPolicy,
    initialized: AtomicBool,
    available: AtomicBool,
    fallback: MemoryIndex,
}

impl VectorStore {
    /// `index = None` means no external endpoint is configured.
    pub fn new(
        index: Option<Arc<dyn VectorIndex>>,
        collection: impl Into<String>,
        dimension: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            index,
            collection: collection.into(),
            dimension,
            retry,
            initialized: AtomicBool::new(false),
            available: AtomicBool::new(false),
            fallback: MemoryIndex::new(),
        }
    }

    /// In-process only.
    pub fn in_memory(dimension: usize) -> Self {
        Self::new(None, "incidents", dimension, RetryPolicy::once())
    }

    /// Connect and ensure the collection exists, retrying per the policy.
    /// Runs at most once per store; later calls report the settled backend.
    pub async fn initialize(&self) -> VectorBackend {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return self.backend();
        }

        let index: &dyn VectorIndex = match &self.index {
            Some(index) => index.as_ref(),
            None => {
                info!("No vector endpoint configured, using in-process index");
                return VectorBackend::Memory;
            }
        };

        let result = self
            .retry
            .run("vector index connect", move || self.ensure_collection(index))
            .await;

        match result {
            Ok(()) => {
                self.available.store(true, Ordering::SeqCst);
                info!("Vector index ready (collection '{}')", self.collection);
            }
            Err(e) => {
                warn!(
                    "Vector index unreachable after {} attempts, using in-process index for this process: {}",
                    self.retry.max_attempts(),
                    e
                );
            }
        }
        self.backend()
    }

    async fn ensure_collection(&self, index: &dyn VectorIndex) -> Result<()> {
        if !index.has_collection(&self.collection).await? {
            index
                .create_collection(&self.collection, self.dimension, DistanceMetric::Cosine)
                .await?;
            info!(
                "Created collection '{}' (dim {}, cosine)",
                self.collection, self.dimension
            );
        }
        Ok(())
    }

    /// Backend that calls will try first.
    pub fn backend(&self) -> VectorBackend {
        if self.available.load(Ordering::SeqCst) {
            VectorBackend::External
        } else {
            VectorBackend::Memory
        }
    }

    fn active_index(&self) -> Option<&dyn VectorIndex> {
        if self.available.load(Ordering::SeqCst) {
            self.index.as_deref()
        } else {
            None
        }
    }

    pub async fn upsert(&self, id: i64, vector: &[f32], metadata: MatchMetadata) -> VectorBackend {
        if let Some(index) = self.active_index() {
            match index.upsert(&self.collection, id, vector, &metadata).await {
                Ok(()) => return VectorBackend::External,
                Err(e) => warn!(
                    "Vector upsert for incident {} failed, using in-process index for this call: {}",
                    id, e
                ),
            }
        }
        self.fallback.upsert(id, vector.to_vec(), metadata);
        VectorBackend::Memory
    }

    pub async fn search(&self, vector: &[f32], top_k: usize) -> SearchResults {
        if let Some(index) = self.active_index() {
            match index.search(&self.collection, vector, top_k).await {
                Ok(mut matches) => {
                    // The index's own ranking is not trusted
                    matches.sort_by(|a, b| match b.score.total_cmp(&a.score) {
                        std::cmp::Ordering::Equal => a.incident_id.cmp(&b.incident_id),
                        other => other,
                    });
                    matches.truncate(top_k);
                    return SearchResults {
                        matches,
                        backend: VectorBackend::External,
                    };
                }
                Err(e) => warn!(
                    "Vector search failed, using in-process index for this call: {}",
                    e
                ),
            }
        }
        SearchResults {
            matches: self.fallback.search(vector, top_k),
            backend: VectorBackend::Memory,
        }
    }

    /// Entries held by the in-process index.
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }
}
