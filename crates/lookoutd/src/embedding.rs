//! Incident text embeddings.
//!
//! `Embedder` wraps any `EmbeddingProvider` and guarantees a vector of exactly
//! `dimension` values: provider output is padded or truncated, and a provider
//! failure yields the zero vector.

use async_trait::async_trait;
use lookout_shared::{EmbeddingSource, Incident, LookoutError, Result};
use lru::LruCache;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const SERVICE: &str = "embedding provider";

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Native-length embedding; the caller fixes the dimension.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Text summary that gets embedded for an incident.
pub fn build_incident_text(incident: &Incident) -> String {
    format!(
        "{}: {} (severity {}/10, {} vehicles, {} lanes blocked)",
        incident.event_type,
        incident.description.trim(),
        incident.rating,
        incident.vehicles_detected,
        incident.blocked_lanes
    )
}

/// Pad with zeros or truncate to exactly `dimension` values.
pub fn fit_dimension(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    vector.resize(dimension, 0.0);
    vector
}

// ============================================================================
// HTTP provider
// ============================================================================

pub struct HttpEmbeddingProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        })
    }
}

/// Accepts `{"embedding": [..]}`, `{"embedding": {"values": [..]}}`
/// and `{"data": [{"embedding": [..]}]}`.
fn parse_embedding_response(body: &Value) -> Option<Vec<f32>> {
    let array = body
        .get("embedding")
        .and_then(|e| e.as_array().or_else(|| e.get("values").and_then(Value::as_array)))
        .or_else(|| {
            body.get("data")
                .and_then(|d| d.get(0))
                .and_then(|d| d.get("embedding"))
                .and_then(Value::as_array)
        })?;

    array
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(LookoutError::unavailable(
                SERVICE,
                format!("HTTP {}", response.status()),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LookoutError::malformed(SERVICE, e))?;

        parse_embedding_response(&json)
            .ok_or_else(|| LookoutError::malformed(SERVICE, "no embedding array in response"))
    }
}

// ============================================================================
// Local feature-hashing provider
// ============================================================================

/// Signed token hashing into `dimension` buckets, L2-normalised. No model,
/// no network; similar wording gives similar vectors.
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

// ============================================================================
// Fixed-dimension wrapper
// ============================================================================

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl Embedder {
    /// `cache_capacity = 0` disables caching.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize, cache_capacity: usize) -> Self {
        Self {
            provider,
            dimension,
            cache: NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Always returns exactly `dimension` values.
    pub async fn embed(&self, text: &str) -> (Vec<f32>, EmbeddingSource) {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().await.get(text) {
                debug!("Embedding cache hit");
                return (hit.clone(), EmbeddingSource::Provider);
            }
        }

        match self.provider.embed(text).await {
            Ok(raw) => {
                if raw.len() != self.dimension {
                    debug!(
                        "{} returned {} values, fitting to {}",
                        self.provider.name(),
                        raw.len(),
                        self.dimension
                    );
                }
                let vector: Vec<f32> = fit_dimension(raw, self.dimension)
                    .into_iter()
                    .map(|x| if x.is_finite() { x } else { 0.0 })
                    .collect();

                if let Some(cache) = &self.cache {
                    cache.lock().await.put(text.to_string(), vector.clone());
                }
                (vector, EmbeddingSource::Provider)
            }
            Err(e) => {
                warn!(
                    "Embedding via {} failed, using zero vector: {}",
                    self.provider.name(),
                    e
                );
                (vec![0.0; self.dimension], EmbeddingSource::ZeroVector)
            }
        }
    }
}
