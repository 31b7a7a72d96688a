//! Operational decision produced once per pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Reroute,
    Monitor,
    Dispatch,
    Dismiss,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Reroute => "reroute",
            Action::Monitor => "monitor",
            Action::Dispatch => "dispatch",
            Action::Dismiss => "dismiss",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reroute" => Ok(Action::Reroute),
            "monitor" => Ok(Action::Monitor),
            "dispatch" => Ok(Action::Dispatch),
            "dismiss" => Ok(Action::Dismiss),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// In [0,1]
    pub final_confidence: f64,
    pub explanation: String,
}

impl Decision {
    pub fn new(action: Action, final_confidence: f64, explanation: impl Into<String>) -> Self {
        Self {
            action,
            final_confidence: final_confidence.clamp(0.0, 1.0),
            explanation: explanation.into(),
        }
    }
}
