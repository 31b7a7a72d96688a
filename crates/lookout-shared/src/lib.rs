//! Shared types for LookOut components.
//!
//! Everything here is plain data plus pure helpers; no I/O. The daemon
//! (`lookoutd`) and the CLI (`lookoutctl`) both speak these types.

pub mod api;
pub mod decision;
pub mod error;
pub mod geo;
pub mod incident;
pub mod similarity;

pub use api::{
    ClassificationSource, DecisionSource, EmbeddingSource, FrameReport, HealthResponse,
    PipelineDebug, SearchHit, SimilarIncident, VectorBackend,
};
pub use decision::{Action, Decision};
pub use error::{LookoutError, Result};
pub use geo::{centroid, parse_avoid_list, parse_point, GeoPoint, RouteCandidate};
pub use incident::{Classification, EventType, Incident, NewIncident};
pub use similarity::{MatchMetadata, SimilarityMatch};

/// Dimension of every incident embedding, process-wide.
pub const EMBEDDING_DIM: usize = 768;

/// Version string reported by the daemon and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
