//! Test doubles for every collaborator port.
//!
//! None of these touch the network or spawn processes. Each records how often
//! it was called so tests can assert on fallback paths.

use async_trait::async_trait;
use lookout_shared::{
    Classification, Decision, GeoPoint, LookoutError, MatchMetadata, Result, RouteCandidate,
    SimilarityMatch,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::classifier::IncidentClassifier;
use crate::embedding::EmbeddingProvider;
use crate::reasoner::{DecisionInput, Reasoner};
use crate::routing::RouteProvider;
use crate::vector::{DistanceMetric, MemoryIndex, VectorIndex};

// ============================================================================
// Classifier
// ============================================================================

pub struct FakeClassifier {
    response: Option<Classification>,
    calls: AtomicUsize,
    hints: Mutex<Vec<Option<String>>>,
}

impl FakeClassifier {
    pub fn returning(classification: Classification) -> Self {
        Self {
            response: Some(classification),
            calls: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails as if the service were down.
    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl IncidentClassifier for FakeClassifier {
    async fn classify(&self, _image: &[u8], hint: Option<&str>) -> Result<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut hints) = self.hints.lock() {
            hints.push(hint.map(str::to_string));
        }
        self.response
            .clone()
            .ok_or_else(|| LookoutError::unavailable("classifier", "fake outage"))
    }
}

// ============================================================================
// Embedding provider
// ============================================================================

pub struct FakeEmbeddingProvider {
    vector: Option<Vec<f32>>,
    calls: AtomicUsize,
}

impl FakeEmbeddingProvider {
    /// Same vector for every text.
    pub fn returning(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            vector: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vector
            .clone()
            .ok_or_else(|| LookoutError::unavailable("embedding provider", "fake outage"))
    }
}

// ============================================================================
// Reasoner
// ============================================================================

pub struct FakeReasoner {
    decision: Option<Decision>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<DecisionInput>>,
}

impl FakeReasoner {
    pub fn returning(decision: Decision) -> Self {
        Self {
            decision: Some(decision),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Behaves like a missing or crashing reasoning process.
    pub fn failing() -> Self {
        Self {
            decision: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<DecisionInput> {
        self.inputs.lock().ok().and_then(|i| i.last().cloned())
    }
}

#[async_trait]
impl Reasoner for FakeReasoner {
    async fn reason(&self, input: &DecisionInput) -> Result<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(input.clone());
        }
        self.decision
            .clone()
            .ok_or_else(|| LookoutError::unavailable("reasoner", "exit status: 1"))
    }
}

// ============================================================================
// Route provider
// ============================================================================

type RouteFn = dyn Fn(&[GeoPoint]) -> Result<Vec<RouteCandidate>> + Send + Sync;

pub struct FakeRouteProvider {
    respond: Box<RouteFn>,
    requests: Mutex<Vec<Vec<GeoPoint>>>,
}

impl FakeRouteProvider {
    /// Answer every request with `respond(waypoints)`.
    pub fn from_fn<F>(respond: F) -> Self
    where
        F: Fn(&[GeoPoint]) -> Result<Vec<RouteCandidate>> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One route straight through the waypoints, 100 s per degree travelled.
    pub fn straight_line() -> Self {
        Self::from_fn(|waypoints| {
            let length: f64 = waypoints
                .windows(2)
                .map(|w| w[0].distance_deg(&w[1]))
                .sum();
            Ok(vec![RouteCandidate::new(
                waypoints.to_vec(),
                length * 111_000.0,
                length * 100.0,
            )])
        })
    }

    /// Every request fails as if the service were down.
    pub fn unavailable() -> Self {
        Self::from_fn(|_| Err(LookoutError::unavailable("routing service", "fake outage")))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<Vec<GeoPoint>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RouteProvider for FakeRouteProvider {
    async fn routes(&self, waypoints: &[GeoPoint]) -> Result<Vec<RouteCandidate>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(waypoints.to_vec());
        }
        (self.respond)(waypoints)
    }
}

// ============================================================================
// Vector index
// ============================================================================

/// External vector index double backed by the in-process index.
pub struct FakeVectorIndex {
    unreachable: AtomicBool,
    failing: AtomicBool,
    collections: Mutex<HashSet<String>>,
    points: MemoryIndex,
    connect_attempts: AtomicUsize,
    upserts: AtomicUsize,
    searches: AtomicUsize,
}

impl FakeVectorIndex {
    pub fn healthy() -> Self {
        Self {
            unreachable: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            collections: Mutex::new(HashSet::new()),
            points: MemoryIndex::new(),
            connect_attempts: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        }
    }

    /// Never reachable, not even at startup.
    pub fn unreachable() -> Self {
        let index = Self::healthy();
        index.unreachable.store(true, Ordering::SeqCst);
        index
    }

    /// Toggle failure of upsert and search after a successful startup.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn has(&self, collection: &str) -> bool {
        self.collections
            .lock()
            .map(|c| c.contains(collection))
            .unwrap_or(false)
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn check(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) || self.unreachable.load(Ordering::SeqCst) {
            return Err(LookoutError::unavailable("vector index", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.check(&self.unreachable)?;
        Ok(self.has(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        _dimension: usize,
        _metric: DistanceMetric,
    ) -> Result<()> {
        self.check(&self.unreachable)?;
        if let Ok(mut collections) = self.collections.lock() {
            collections.insert(name.to_string());
        }
        Ok(())
    }

    async fn upsert(
        &self,
        _collection: &str,
        id: i64,
        vector: &[f32],
        payload: &MatchMetadata,
    ) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check(&self.failing)?;
        self.points.upsert(id, vector.to_vec(), payload.clone());
        Ok(())
    }

    async fn search(
        &self,
        _collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.check(&self.failing)?;
        Ok(self.points.search(vector, top_k))
    }
}
