//! Frame pipeline.
//!
//! Classify, persist, embed, upsert, search, aggregate, decide and, when the
//! decision is to reroute around blocked lanes, plan a route. Stages run in
//! order; only a failed incident write aborts a run.

use chrono::Utc;
use lookout_shared::{
    Action, EmbeddingSource, EventType, FrameReport, GeoPoint, MatchMetadata, NewIncident,
    PipelineDebug, Result, RouteCandidate, SearchHit, SimilarIncident, EMBEDDING_DIM,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregate::{detect_false_positive_cluster, estimate_clearance};
use crate::classifier::{classify_with_fallback, IncidentClassifier};
use crate::embedding::{build_incident_text, Embedder, HashingEmbeddingProvider};
use crate::frames::FrameArchive;
use crate::reasoner::{DecisionEngine, DecisionInput};
use crate::routing::RoutePlanner;
use crate::store::IncidentStore;
use crate::vector::VectorStore;

/// Similar incidents returned per frame unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 5;

/// Half-length of the reroute corridor through an incident, in degrees.
pub const DEFAULT_DETOUR_SPAN_DEG: f64 = 0.01;

/// One uploaded frame.
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub image: Vec<u8>,
    /// Where the frame was taken; becomes the incident location.
    pub location: GeoPoint,
    /// Original filename, used as a classification hint.
    pub filename: Option<String>,
    /// Explicit trip destination for rerouting.
    pub destination: Option<GeoPoint>,
}

impl FrameRequest {
    pub fn new(image: Vec<u8>, location: GeoPoint) -> Self {
        Self {
            image,
            location,
            filename: None,
            destination: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_destination(mut self, destination: GeoPoint) -> Self {
        self.destination = Some(destination);
        self
    }
}

/// User-facing notification from event type and rating.
pub fn build_notification(event_type: EventType, rating: u8) -> String {
    let base = match event_type {
        EventType::Accident => "Accident reported",
        EventType::SpeedSensor => "Speed sensor detected",
        EventType::Hazard => "Road hazard detected",
        _ => "Incident detected",
    };
    if rating >= 7 {
        format!("{} ahead (severity {}/10). Consider alternate route.", base, rating)
    } else {
        format!("{} ahead near your route.", base)
    }
}

/// Trip to plan around an incident at `location`: a corridor through it, or
/// from it to an explicit destination.
pub fn reroute_trip(location: GeoPoint, destination: Option<GeoPoint>, span: f64) -> (GeoPoint, GeoPoint) {
    match destination {
        Some(dest) => (location, dest),
        None => (location.offset(-span, -span), location.offset(span, span)),
    }
}

pub struct Pipeline {
    classifier: Option<Arc<dyn IncidentClassifier>>,
    store: IncidentStore,
    frames: Option<FrameArchive>,
    embedder: Embedder,
    vectors: Arc<VectorStore>,
    decisions: DecisionEngine,
    planner: RoutePlanner,
    top_k: usize,
    detour_span: f64,
}

impl Pipeline {
    /// Heuristic classification, hashing embeddings, rule decisions and no
    /// frame archive until configured otherwise.
    pub fn new(store: IncidentStore, vectors: Arc<VectorStore>, planner: RoutePlanner) -> Self {
        Self {
            classifier: None,
            store,
            frames: None,
            embedder: Embedder::new(
                Arc::new(HashingEmbeddingProvider::new(EMBEDDING_DIM)),
                EMBEDDING_DIM,
                0,
            ),
            vectors,
            decisions: DecisionEngine::rules_only(),
            planner,
            top_k: DEFAULT_TOP_K,
            detour_span: DEFAULT_DETOUR_SPAN_DEG,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IncidentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_decisions(mut self, decisions: DecisionEngine) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn with_frames(mut self, frames: FrameArchive) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_detour_span(mut self, span: f64) -> Self {
        self.detour_span = span;
        self
    }

    pub fn store(&self) -> &IncidentStore {
        &self.store
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn planner(&self) -> &RoutePlanner {
        &self.planner
    }

    pub async fn process_frame(&self, request: FrameRequest) -> Result<FrameReport> {
        let hint = request.filename.as_deref();

        info!("Step 1: Classify frame ({} bytes)", request.image.len());
        let (classification, classification_source) =
            classify_with_fallback(self.classifier.as_ref(), &request.image, hint).await;

        info!("Step 2: Persist incident");
        let pending = self.archive_pending(&request.image).await;
        let notification = build_notification(classification.event_type, classification.rating);
        let new_incident = NewIncident {
            classification,
            location: request.location,
            image_path: pending.as_ref().map(|p| p.to_string_lossy().into_owned()),
            timestamp: Utc::now(),
            clearance_minutes: None,
            notification: notification.clone(),
        };
        let id = match self.store.insert(&new_incident).await {
            Ok(id) => id,
            Err(e) => {
                if let Some(pending) = &pending {
                    self.archive_discard(pending).await;
                }
                return Err(e);
            }
        };
        let mut incident = new_incident.into_incident(id);
        if let Some(pending) = pending {
            if let Some(path) = self.archive_finalize(&pending, id).await {
                incident.image_path = Some(path);
            }
        }

        info!("Step 3: Generate embedding");
        let text = build_incident_text(&incident);
        let (vector, embedding_source) = self.embedder.embed(&text).await;

        info!("Step 4: Upsert vector");
        let upsert_backend = self
            .vectors
            .upsert(id, &vector, MatchMetadata::from_incident(&incident))
            .await;

        info!("Step 5: Search similar incidents");
        // The fresh incident is already indexed and counts among its own matches
        let results = self.vectors.search(&vector, self.top_k).await;
        let matches = results.matches;

        info!("Step 6: Estimate clearance and check false-positive cluster");
        let clearance = estimate_clearance(&matches);
        let is_false_positive = detect_false_positive_cluster(&matches, incident.confidence);

        info!("Step 7: Decide");
        let input = DecisionInput::new(&incident, matches.len(), clearance, is_false_positive);
        let (decision, decision_source) = self.decisions.decide(&input).await;

        let route = if decision.action == Action::Reroute && incident.blocked_lanes > 0 {
            info!("Step 8: Plan reroute");
            self.plan_reroute(incident.location(), request.destination).await
        } else {
            info!("Step 8: No reroute needed");
            None
        };

        info!(
            "Pipeline complete: incident {} {} -> {}",
            id, incident.event_type, decision.action
        );

        Ok(FrameReport {
            similar_incidents: matches.iter().map(SimilarIncident::from).collect(),
            estimated_clearance_minutes: clearance,
            is_false_positive,
            notification,
            decision,
            route,
            debug: PipelineDebug {
                classification: classification_source,
                embedding: embedding_source,
                vector_upsert: upsert_backend,
                vector_search: results.backend,
                decision: decision_source,
            },
            incident,
        })
    }

    /// Stored incidents ranked by similarity to a free-text query. Empty
    /// when the query cannot be embedded.
    pub async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let (vector, source) = self.embedder.embed(query).await;
        if source == EmbeddingSource::ZeroVector {
            warn!("Search query could not be embedded, returning no results");
            return Ok(Vec::new());
        }

        let results = self.vectors.search(&vector, limit).await;
        let mut hits = Vec::with_capacity(results.matches.len());
        for m in results.matches {
            match self.store.get(m.incident_id).await? {
                Some(incident) => hits.push(SearchHit {
                    incident,
                    score: m.score,
                }),
                None => debug!("Indexed incident {} has no stored row", m.incident_id),
            }
        }
        Ok(hits)
    }

    /// Archived frame bytes for incident `id`, if any.
    pub async fn frame(&self, id: i64) -> Result<Option<Vec<u8>>> {
        match &self.frames {
            Some(frames) => frames.read(id).await,
            None => Ok(None),
        }
    }

    async fn plan_reroute(&self, location: GeoPoint, destination: Option<GeoPoint>) -> Option<RouteCandidate> {
        let (origin, dest) = reroute_trip(location, destination, self.detour_span);
        match self.planner.plan(origin, dest, &[location]).await {
            Ok(route) => Some(route),
            Err(e) => {
                warn!("Route planning failed, continuing without a route: {}", e);
                None
            }
        }
    }

    async fn archive_pending(&self, image: &[u8]) -> Option<PathBuf> {
        let frames = self.frames.as_ref()?;
        match frames.save_pending(image).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to save frame: {}", e);
                None
            }
        }
    }

    async fn archive_discard(&self, pending: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_file(pending).await {
            warn!("Failed to remove orphaned frame {}: {}", pending.display(), e);
        }
    }

    async fn archive_finalize(&self, pending: &std::path::Path, id: i64) -> Option<String> {
        let frames = self.frames.as_ref()?;
        let path = match frames.finalize(pending, id).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to rename frame for incident {}: {}", id, e);
                return None;
            }
        };
        if let Err(e) = self.store.update_image_path(id, &path).await {
            warn!("Failed to record image path for incident {}: {}", id, e);
        }
        Some(path)
    }
}
