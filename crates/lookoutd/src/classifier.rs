//! Frame classification.
//!
//! The vision service is unreliable by contract: any failure falls back to a
//! keyword heuristic over the filename hint.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lookout_shared::{Classification, ClassificationSource, EventType, LookoutError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm::extract_json;

const SERVICE: &str = "classifier";

#[async_trait]
pub trait IncidentClassifier: Send + Sync {
    async fn classify(&self, image: &[u8], hint: Option<&str>) -> Result<Classification>;
}

/// Map a severity word to the 1-10 rating scale.
pub fn severity_to_rating(severity: &str) -> Option<u8> {
    match severity.trim().to_lowercase().as_str() {
        "none" => Some(1),
        "low" => Some(3),
        "moderate" | "medium" => Some(5),
        "high" => Some(7),
        "critical" | "severe" => Some(9),
        _ => None,
    }
}

fn build_classifier_prompt(hint: Option<&str>) -> String {
    let categories: Vec<&str> = EventType::ALL
        .iter()
        .filter(|t| **t != EventType::Unknown)
        .map(|t| t.as_str())
        .collect();

    let mut prompt = format!(
        r#"Classify the traffic camera frame. Output JSON only:
{{"event_type":"<{}>","confidence":0.0,"vehicles_detected":0,"blocked_lanes":0,"severity":"<none|low|moderate|high|critical>","description":"<one sentence>"}}
blocked_lanes is 0 when traffic flows freely. JSON ONLY."#,
        categories.join("|")
    );
    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        prompt.push_str(&format!("\nHint: {}", hint.trim()));
    }
    prompt
}

/// Raw classifier JSON; every field optional so partial answers can be judged.
#[derive(Debug, Deserialize)]
struct ClassifierOutput {
    event_type: Option<String>,
    confidence: Option<f64>,
    vehicles_detected: Option<i64>,
    blocked_lanes: Option<i64>,
    rating: Option<f64>,
    severity: Option<String>,
    description: Option<String>,
}

fn count(v: Option<i64>) -> u32 {
    v.unwrap_or(0).clamp(0, u32::MAX as i64) as u32
}

/// Parse classifier text into a normalized classification.
pub fn parse_classification(text: &str) -> Result<Classification> {
    let json_str = extract_json(text)
        .ok_or_else(|| LookoutError::malformed(SERVICE, "no JSON object in response"))?;
    let output: ClassifierOutput =
        serde_json::from_str(json_str).map_err(|e| LookoutError::malformed(SERVICE, e))?;

    let event_type = output
        .event_type
        .as_deref()
        .map(EventType::parse)
        .ok_or_else(|| LookoutError::malformed(SERVICE, "missing event_type"))?;
    let confidence = output
        .confidence
        .ok_or_else(|| LookoutError::malformed(SERVICE, "missing confidence"))?;

    let rating = match (output.rating, output.severity.as_deref()) {
        (Some(r), _) if r.is_finite() => r.round().clamp(1.0, 10.0) as u8,
        (_, Some(s)) => severity_to_rating(s).unwrap_or(3),
        _ => 3,
    };

    Ok(Classification {
        event_type,
        confidence,
        vehicles_detected: count(output.vehicles_detected),
        blocked_lanes: count(output.blocked_lanes),
        rating,
        description: output.description.unwrap_or_default(),
    }
    .normalized())
}

// ============================================================================
// HTTP vision service
// ============================================================================

/// Vision model behind a generate-style endpoint: the image goes up base64
/// encoded, the answer comes back either as the JSON itself or wrapped in a
/// `response` text field.
pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpClassifier {
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

#[async_trait]
impl IncidentClassifier for HttpClassifier {
    async fn classify(&self, image: &[u8], hint: Option<&str>) -> Result<Classification> {
        let prompt = build_classifier_prompt(hint);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [BASE64.encode(image)],
            "format": "json",
            "stream": false,
        });

        info!(
            "Classifier: sending frame ({} bytes) to {}",
            image.len(),
            self.model
        );

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

        let text = response
            .text()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;

        // Generate-style envelope or bare JSON
        let inner = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("response").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);

        parse_classification(&inner)
    }
}

// ============================================================================
// Heuristic fallback
// ============================================================================

struct Heuristic {
    keywords: &'static [&'static str],
    event_type: EventType,
    confidence: f64,
    rating: u8,
    vehicles: u32,
    lanes: u32,
}

const HEURISTICS: &[Heuristic] = &[
    Heuristic { keywords: &["accident", "crash", "collision"], event_type: EventType::Accident, confidence: 0.75, rating: 8, vehicles: 2, lanes: 1 },
    Heuristic { keywords: &["fire"], event_type: EventType::Fire, confidence: 0.7, rating: 9, vehicles: 1, lanes: 1 },
    Heuristic { keywords: &["flood"], event_type: EventType::Flooding, confidence: 0.7, rating: 7, vehicles: 0, lanes: 1 },
    Heuristic { keywords: &["construction", "roadwork"], event_type: EventType::Construction, confidence: 0.65, rating: 5, vehicles: 0, lanes: 1 },
    Heuristic { keywords: &["stall", "breakdown"], event_type: EventType::StalledVehicle, confidence: 0.6, rating: 5, vehicles: 1, lanes: 1 },
    Heuristic { keywords: &["police"], event_type: EventType::PoliceActivity, confidence: 0.6, rating: 5, vehicles: 1, lanes: 0 },
    Heuristic { keywords: &["debris"], event_type: EventType::Debris, confidence: 0.6, rating: 6, vehicles: 0, lanes: 1 },
    Heuristic { keywords: &["speed", "sensor"], event_type: EventType::SpeedSensor, confidence: 0.6, rating: 3, vehicles: 0, lanes: 0 },
    Heuristic { keywords: &["hazard"], event_type: EventType::Hazard, confidence: 0.6, rating: 6, vehicles: 0, lanes: 0 },
    Heuristic { keywords: &["traffic", "normal"], event_type: EventType::NormalTraffic, confidence: 0.6, rating: 1, vehicles: 0, lanes: 0 },
];

/// Keyword classification over the filename hint. First matching row wins;
/// no hint or no match gives the generic `unknown` default.
pub fn classify_fallback(hint: Option<&str>) -> Classification {
    let h = hint.unwrap_or("").to_lowercase();

    let matched = HEURISTICS
        .iter()
        .find(|row| row.keywords.iter().any(|k| h.contains(k)));

    match matched {
        Some(row) => Classification {
            event_type: row.event_type,
            confidence: row.confidence,
            vehicles_detected: row.vehicles,
            blocked_lanes: row.lanes,
            rating: row.rating,
            description: format!("Heuristic classification from '{}'", hint.unwrap_or("").trim()),
        },
        None => Classification {
            event_type: EventType::Unknown,
            confidence: 0.3,
            vehicles_detected: 0,
            blocked_lanes: 0,
            rating: 3,
            description: "Unable to classify: classifier unavailable".to_string(),
        },
    }
}

/// Classify with the service when configured, heuristics otherwise. Never fails.
pub async fn classify_with_fallback(
    classifier: Option<&Arc<dyn IncidentClassifier>>,
    image: &[u8],
    hint: Option<&str>,
) -> (Classification, ClassificationSource) {
    let Some(classifier) = classifier else {
        return (classify_fallback(hint), ClassificationSource::Heuristic);
    };

    match classifier.classify(image, hint).await {
        Ok(c) => {
            info!(
                "Classified frame: {} ({:.2})",
                c.event_type, c.confidence
            );
            (c, ClassificationSource::Service)
        }
        Err(e) => {
            warn!("Classifier failed, using heuristic fallback: {}", e);
            (classify_fallback(hint), ClassificationSource::Heuristic)
        }
    }
}
