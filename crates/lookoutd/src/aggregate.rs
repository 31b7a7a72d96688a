//! Signals derived from similar past incidents. Pure functions.

use lookout_shared::SimilarityMatch;

/// Clearance estimate when no similar incident carries one.
pub const DEFAULT_CLEARANCE_MINUTES: f64 = 30.0;

/// A similar incident below this confidence counts as a likely false alarm.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.4;

/// Fraction of low-confidence matches needed to call a cluster.
pub const FALSE_POSITIVE_FRACTION: f64 = 0.6;

/// The current detection must also be below this to be dismissed as a cluster.
pub const CURRENT_CONFIDENCE_CEILING: f64 = 0.6;

/// Mean positive clearance over the matches, rounded to one decimal.
pub fn estimate_clearance(matches: &[SimilarityMatch]) -> f64 {
    let clearances: Vec<f64> = matches
        .iter()
        .filter_map(|m| m.metadata.clearance_minutes)
        .filter(|c| c.is_finite() && *c > 0.0)
        .collect();

    if clearances.is_empty() {
        return DEFAULT_CLEARANCE_MINUTES;
    }

    let mean = clearances.iter().sum::<f64>() / clearances.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// True when most similar incidents that report a confidence were low
/// confidence and the current detection is weak too.
pub fn detect_false_positive_cluster(matches: &[SimilarityMatch], current_confidence: f64) -> bool {
    let confidences: Vec<f64> = matches
        .iter()
        .filter_map(|m| m.metadata.confidence)
        .collect();

    if confidences.is_empty() {
        return false;
    }

    let low = confidences
        .iter()
        .filter(|c| **c < LOW_CONFIDENCE_THRESHOLD)
        .count();
    let fraction = low as f64 / confidences.len() as f64;

    fraction > FALSE_POSITIVE_FRACTION && current_confidence < CURRENT_CONFIDENCE_CEILING
}
