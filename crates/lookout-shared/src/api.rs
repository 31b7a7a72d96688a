//! Wire types returned by the daemon's HTTP API.

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::geo::RouteCandidate;
use crate::incident::Incident;
use crate::similarity::SimilarityMatch;

/// Which path produced the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Service,
    Heuristic,
}

/// Which path produced the embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
    Provider,
    ZeroVector,
}

/// Which vector backend served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    External,
    Memory,
}

/// Which path produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Reasoner,
    Rules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDebug {
    pub classification: ClassificationSource,
    pub embedding: EmbeddingSource,
    pub vector_upsert: VectorBackend,
    pub vector_search: VectorBackend,
    pub decision: DecisionSource,
}

/// Compact view of a similar past incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub id: i64,
    pub event_type: String,
    pub confidence: f64,
    pub score: f32,
}

impl From<&SimilarityMatch> for SimilarIncident {
    fn from(m: &SimilarityMatch) -> Self {
        Self {
            id: m.incident_id,
            event_type: m
                .metadata
                .event_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            confidence: m.metadata.confidence.unwrap_or(0.0),
            score: m.score,
        }
    }
}

/// Full result of processing one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub incident: Incident,
    pub similar_incidents: Vec<SimilarIncident>,
    pub estimated_clearance_minutes: f64,
    pub is_false_positive: bool,
    pub notification: String,
    pub decision: Decision,
    pub route: Option<RouteCandidate>,
    pub debug: PipelineDebug,
}

/// One free-text search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub incident: Incident,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub vector_backend: VectorBackend,
}
