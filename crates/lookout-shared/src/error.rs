//! Error types for LookOut.

use std::fmt::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LookoutError>;

#[derive(Error, Debug)]
pub enum LookoutError {
    #[error("{service} unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },

    #[error("Malformed response from {service}: {reason}")]
    MalformedResponse {
        service: &'static str,
        reason: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("No route found")]
    NoRouteFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LookoutError {
    pub fn unavailable(service: &'static str, reason: impl Display) -> Self {
        LookoutError::ServiceUnavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(service: &'static str, reason: impl Display) -> Self {
        LookoutError::MalformedResponse {
            service,
            reason: reason.to_string(),
        }
    }

    pub fn persistence(reason: impl Display) -> Self {
        LookoutError::Persistence(reason.to_string())
    }

    /// Only a failed incident write aborts a pipeline run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LookoutError::Persistence(_))
    }

    /// Errors that always have a local fallback path.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            LookoutError::ServiceUnavailable { .. } | LookoutError::MalformedResponse { .. }
        )
    }
}
