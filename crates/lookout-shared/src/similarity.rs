//! Similarity search results.

use serde::{Deserialize, Serialize};

use crate::incident::Incident;

/// Metadata snapshot stored next to each vector. Every field is optional
/// because entries written by older builds or other producers may omit any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub clearance_minutes: Option<f64>,
}

impl MatchMetadata {
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            event_type: Some(incident.event_type.to_string()),
            confidence: Some(incident.confidence),
            rating: Some(incident.rating),
            clearance_minutes: incident.clearance_minutes,
        }
    }
}

/// One search hit. `score` is cosine similarity in [-1,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub incident_id: i64,
    pub score: f32,
    pub metadata: MatchMetadata,
}
