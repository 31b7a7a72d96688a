//! HTTP client for an external vector database speaking a JSON collection API.

use async_trait::async_trait;
use lookout_shared::{LookoutError, MatchMetadata, Result, SimilarityMatch};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{DistanceMetric, VectorIndex};

const SERVICE: &str = "vector index";

pub struct HttpVectorIndex {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<MatchMetadata>,
}

/// Point ids come back as numbers or numeric strings depending on the server.
fn parse_point_id(id: &Value) -> Option<i64> {
    match id {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl HttpVectorIndex {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.base_url, name)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;
        if !response.status().is_success() {
            return Err(LookoutError::unavailable(
                SERVICE,
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        let response = self
            .http
            .get(self.collection_url(name))
            .send()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(LookoutError::unavailable(SERVICE, format!("HTTP {}", s))),
        }
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<()> {
        let body = json!({
            "vectors": { "size": dimension, "distance": metric.as_str() }
        });
        self.send(self.http.put(self.collection_url(name)).json(&body))
            .await?;
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        id: i64,
        vector: &[f32],
        payload: &MatchMetadata,
    ) -> Result<()> {
        let body = json!({
            "points": [{ "id": id, "vector": vector, "payload": payload }]
        });
        let url = format!("{}/points", self.collection_url(collection));
        self.send(self.http.put(url).json(&body)).await?;
        debug!("Upserted vector for incident {}", id);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        let body = json!({ "vector": vector, "limit": top_k, "with_payload": true });
        let url = format!("{}/points/search", self.collection_url(collection));
        let response = self.send(self.http.post(url).json(&body)).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| LookoutError::malformed(SERVICE, e))?;

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|p| {
                let incident_id = parse_point_id(&p.id)?;
                Some(SimilarityMatch {
                    incident_id,
                    score: p.score,
                    metadata: p.payload.unwrap_or_default(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point_id() {
        assert_eq!(parse_point_id(&json!(42)), Some(42));
        assert_eq!(parse_point_id(&json!("17")), Some(17));
        assert_eq!(parse_point_id(&json!("a1b2")), None);
        assert_eq!(parse_point_id(&json!(null)), None);
    }

    #[test]
    fn test_search_response_tolerates_missing_payload_fields() {
        let raw = r#"{"result":[
            {"id": 3, "score": 0.91, "payload": {"event_type": "accident", "clearance_minutes": 25.0}},
            {"id": "9", "score": 0.5}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.result.len(), 2);

        let first = parsed.result[0].payload.clone().unwrap();
        assert_eq!(first.clearance_minutes, Some(25.0));
        assert!(first.confidence.is_none());
        assert!(parsed.result[1].payload.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let index = HttpVectorIndex::new("http://localhost:6333/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            index.collection_url("incidents"),
            "http://localhost:6333/collections/incidents"
        );
    }
}
