//! In-process vector index: incident id -> (vector, metadata).

use lookout_shared::{MatchMetadata, SimilarityMatch};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

/// Cosine similarity; 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut na2 = 0.0f64;
    let mut nb2 = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na2 += x * x;
        nb2 += y * y;
    }
    if na2 == 0.0 || nb2 == 0.0 {
        return 0.0;
    }
    let sim = dot / (na2.sqrt() * nb2.sqrt());
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    metadata: MatchMetadata,
}

/// Guards are never held across an await; concurrent upserts to one id
/// are last-write-wins.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<i64, Entry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, id: i64, vector: Vec<f32>, metadata: MatchMetadata) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(id, Entry { vector, metadata });
    }

    /// Score every entry, best first, at most `top_k` results.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SimilarityMatch> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());

        let mut matches: Vec<SimilarityMatch> = entries
            .iter()
            .map(|(id, entry)| SimilarityMatch {
                incident_id: *id,
                score: cosine_similarity(query, &entry.vector),
                metadata: entry.metadata.clone(),
            })
            .collect();
        drop(entries);

        // Ties break on id so results are stable across HashMap iteration order
        matches.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.incident_id.cmp(&b.incident_id),
            other => other,
        });
        matches.truncate(top_k);
        matches
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn meta(event_type: &str) -> MatchMetadata {
        MatchMetadata {
            event_type: Some(event_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_cosine_self_is_one() {
        let v = [0.3, -1.2, 4.0, 0.01];
        assert_relative_eq!(cosine_similarity(&v, &v), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0; 3], &[0.0; 3]), 0.0);
    }

    #[test]
    fn test_cosine_opposite_is_minus_one() {
        assert_relative_eq!(
            cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]),
            -1.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_search_sorted_and_bounded() {
        let index = MemoryIndex::new();
        index.upsert(1, vec![1.0, 0.0], meta("accident"));
        index.upsert(2, vec![0.7, 0.7], meta("debris"));
        index.upsert(3, vec![0.0, 1.0], meta("fire"));
        index.upsert(4, vec![-1.0, 0.0], meta("hazard"));

        let hits = index.search(&[1.0, 0.1], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].incident_id, 1);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let all = index.search(&[1.0, 0.1], 10);
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].incident_id, 4);
    }

    #[test]
    fn test_upsert_same_id_replaces() {
        let index = MemoryIndex::new();
        index.upsert(7, vec![1.0, 0.0], meta("accident"));
        index.upsert(7, vec![0.0, 1.0], meta("fire"));

        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 1);
        assert_eq!(hits[0].metadata.event_type.as_deref(), Some("fire"));
        assert_relative_eq!(hits[0].score, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_search_empty_index() {
        assert!(MemoryIndex::new().search(&[1.0], 5).is_empty());
    }
}
