//! Decision reasoning.
//!
//! An external reasoning process is asked first; if it is disabled, missing,
//! slow, failing or talks nonsense, the rule table decides instead.

use async_trait::async_trait;
use lookout_shared::{Action, Decision, DecisionSource, EventType, Incident, LookoutError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::llm::extract_json;

const SERVICE: &str = "reasoner";

/// JSON schema handed to the reasoning process for its answer.
pub const OUTPUT_SCHEMA: &str = r#"{"action":{"type":"string"},"final_confidence":{"type":"number"},"explanation":{"type":"string"}}"#;

/// Multiplier applied to confidence when a detection is dismissed as a false positive.
pub const FALSE_POSITIVE_PENALTY: f64 = 0.3;

/// Everything a decision is based on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionInput {
    pub event_type: EventType,
    pub confidence: f64,
    pub rating: u8,
    pub vehicles_detected: u32,
    pub blocked_lanes: u32,
    pub similar_count: usize,
    pub estimated_clearance: f64,
    pub is_false_positive: bool,
}

impl DecisionInput {
    pub fn new(
        incident: &Incident,
        similar_count: usize,
        estimated_clearance: f64,
        is_false_positive: bool,
    ) -> Self {
        Self {
            event_type: incident.event_type,
            confidence: incident.confidence,
            rating: incident.rating,
            vehicles_detected: incident.vehicles_detected,
            blocked_lanes: incident.blocked_lanes,
            similar_count,
            estimated_clearance,
            is_false_positive,
        }
    }
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, input: &DecisionInput) -> Result<Decision>;
}

// ============================================================================
// Rule table
// ============================================================================

/// Deterministic decision, first matching row wins.
pub fn rule_decision(input: &DecisionInput) -> Decision {
    let c = input.confidence;

    if input.is_false_positive {
        return Decision::new(
            Action::Dismiss,
            c * FALSE_POSITIVE_PENALTY,
            format!(
                "Likely false positive: most of {} similar incidents were low confidence",
                input.similar_count
            ),
        );
    }

    if input.rating >= 7 && c > 0.7 {
        return Decision::new(
            Action::Reroute,
            c,
            format!(
                "High severity {} (rating {}/10, confidence {:.2}), {} lanes blocked; reroute traffic",
                input.event_type, input.rating, c, input.blocked_lanes
            ),
        );
    }

    if input.rating >= 4 || c > 0.5 {
        return Decision::new(
            Action::Monitor,
            c,
            format!(
                "Moderate {} (rating {}/10, confidence {:.2}); monitor, expected clearance {:.0} min",
                input.event_type, input.rating, c, input.estimated_clearance
            ),
        );
    }

    Decision::new(
        Action::Monitor,
        c,
        format!(
            "Low severity {} (rating {}/10, confidence {:.2}); monitor",
            input.event_type, input.rating, c
        ),
    )
}

// ============================================================================
// External reasoning process
// ============================================================================

pub fn build_reasoner_prompt(input: &DecisionInput) -> String {
    let payload = serde_json::to_string(input).unwrap_or_default();
    format!(
        "You are a traffic operations decision engine. Incident: {payload}\n\
         Event type: {}, confidence: {:.2}, severity rating: {}/10, vehicles: {}, \
         blocked lanes: {}, similar incidents: {}, estimated clearance: {:.1} min, \
         likely false positive: {}.\n\
         Decide one action: reroute, monitor, dispatch or dismiss. \
         Answer with JSON containing action, final_confidence (0-1) and explanation.",
        input.event_type,
        input.confidence,
        input.rating,
        input.vehicles_detected,
        input.blocked_lanes,
        input.similar_count,
        input.estimated_clearance,
        input.is_false_positive,
    )
}

#[derive(Debug, Deserialize)]
struct ReasonerOutput {
    action: String,
    final_confidence: Option<f64>,
    #[serde(default)]
    explanation: String,
}

/// Parse reasoning output; an unknown action is malformed, not a guess.
pub fn parse_decision(text: &str) -> Result<Decision> {
    let json_str = extract_json(text)
        .ok_or_else(|| LookoutError::malformed(SERVICE, "no JSON object in output"))?;
    let output: ReasonerOutput =
        serde_json::from_str(json_str).map_err(|e| LookoutError::malformed(SERVICE, e))?;

    let action: Action = output
        .action
        .parse()
        .map_err(|e: String| LookoutError::malformed(SERVICE, e))?;
    let confidence = output
        .final_confidence
        .filter(|c| c.is_finite())
        .ok_or_else(|| LookoutError::malformed(SERVICE, "missing final_confidence"))?;

    Ok(Decision::new(action, confidence, output.explanation))
}

/// Runs `<command> chat --prompt P --output-schema S` and reads JSON from stdout.
/// At most `workers` processes run at once; a process that outlives the
/// timeout is killed.
pub struct CliReasoner {
    command: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl CliReasoner {
    pub fn new(command: &str, timeout: Duration, workers: usize) -> Self {
        Self {
            command: command.to_string(),
            timeout,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }
}

#[async_trait]
impl Reasoner for CliReasoner {
    async fn reason(&self, input: &DecisionInput) -> Result<Decision> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;

        let prompt = build_reasoner_prompt(input);
        let mut cmd = Command::new(&self.command);
        cmd.arg("chat")
            .arg("--prompt")
            .arg(&prompt)
            .arg("--output-schema")
            .arg(OUTPUT_SCHEMA)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(LookoutError::unavailable(
                    SERVICE,
                    format!("timed out after {}s", self.timeout.as_secs()),
                ))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LookoutError::unavailable(
                    SERVICE,
                    format!("'{}' not found on PATH", self.command),
                ))
            }
            Ok(Err(e)) => return Err(LookoutError::unavailable(SERVICE, e)),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.trim().chars().take(200).collect();
            return Err(LookoutError::unavailable(
                SERVICE,
                format!("{}: {}", output.status, snippet),
            ));
        }

        parse_decision(&String::from_utf8_lossy(&output.stdout))
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct DecisionEngine {
    reasoner: Option<Arc<dyn Reasoner>>,
}

impl DecisionEngine {
    pub fn new(reasoner: Option<Arc<dyn Reasoner>>) -> Self {
        Self { reasoner }
    }

    /// Rules only.
    pub fn rules_only() -> Self {
        Self::new(None)
    }

    /// Never fails: any reasoner error falls back to the rule table.
    pub async fn decide(&self, input: &DecisionInput) -> (Decision, DecisionSource) {
        if let Some(reasoner) = &self.reasoner {
            match reasoner.reason(input).await {
                Ok(decision) => {
                    info!(
                        "Reasoner decision: {} ({:.2})",
                        decision.action, decision.final_confidence
                    );
                    return (decision, DecisionSource::Reasoner);
                }
                Err(e) => warn!("Reasoner failed, using rule fallback: {}", e),
            }
        }
        (rule_decision(input), DecisionSource::Rules)
    }
}
