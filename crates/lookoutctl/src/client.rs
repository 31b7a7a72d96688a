//! HTTP client for lookoutd

use anyhow::{Context, Result};
use lookout_shared::{FrameReport, GeoPoint, HealthResponse, Incident, RouteCandidate, SearchHit};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Daemon address used when `--url` is not given
pub const DEFAULT_URL: &str = "http://127.0.0.1:8000";

/// Frame processing can include a full reroute search
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// One frame upload.
#[derive(Debug, Clone)]
pub struct FrameUpload {
    pub image: Vec<u8>,
    pub location: GeoPoint,
    pub filename: Option<String>,
    pub destination: Option<GeoPoint>,
}

impl FrameUpload {
    /// Query string for `/v1/frames`.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("lat", self.location.lat.to_string()),
            ("lon", self.location.lon.to_string()),
        ];
        if let Some(filename) = &self.filename {
            query.push(("filename", filename.clone()));
        }
        if let Some(dest) = &self.destination {
            query.push(("dest_lat", dest.lat.to_string()));
            query.push(("dest_lon", dest.lon.to_string()));
        }
        query
    }
}

/// Query string for `/v1/search`.
pub fn search_query(text: &str, limit: Option<usize>) -> Vec<(&'static str, String)> {
    let mut query = vec![("q", text.to_string())];
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

/// Client for the lookoutd HTTP API
pub struct LookoutClient {
    client: reqwest::Client,
    base_url: String,
}

impl LookoutClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("lookoutd request failed ({}): {}", status, text);
        }
        resp.json()
            .await
            .context("Failed to parse lookoutd response")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("Cannot reach lookoutd at {}", self.base_url))?;
        self.decode(resp).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/v1/health", &[]).await
    }

    /// Upload a frame and return the raw JSON response.
    pub async fn process_raw(&self, upload: &FrameUpload) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.url("/v1/frames"))
            .query(&upload.query())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(upload.image.clone())
            .send()
            .await
            .with_context(|| format!("Cannot reach lookoutd at {}", self.base_url))?;
        self.decode(resp).await
    }

    pub async fn process(&self, upload: &FrameUpload) -> Result<FrameReport> {
        let value = self.process_raw(upload).await?;
        serde_json::from_value(value).context("Unexpected frame report shape")
    }

    pub async fn incidents(&self, limit: Option<usize>) -> Result<Vec<Incident>> {
        let query: Vec<(&str, String)> = limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default();
        self.get("/v1/incidents", &query).await
    }

    pub async fn incident(&self, id: i64) -> Result<Incident> {
        self.get(&format!("/v1/incidents/{}", id), &[]).await
    }

    pub async fn search(&self, text: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        self.get("/v1/search", &search_query(text, limit)).await
    }

    /// Archived JPEG bytes for an incident.
    pub async fn frame(&self, id: i64) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/incidents/{}/frame", id)))
            .send()
            .await
            .with_context(|| format!("Cannot reach lookoutd at {}", self.base_url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("lookoutd request failed ({}): {}", status, text);
        }
        let bytes = resp.bytes().await.context("Failed to read frame body")?;
        Ok(bytes.to_vec())
    }

    pub async fn route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
        avoid: Option<&str>,
    ) -> Result<RouteCandidate> {
        let mut query = vec![
            ("from_lat", from.lat.to_string()),
            ("from_lng", from.lon.to_string()),
            ("to_lat", to.lat.to_string()),
            ("to_lng", to.lon.to_string()),
        ];
        if let Some(avoid) = avoid.filter(|a| !a.trim().is_empty()) {
            query.push(("avoid", avoid.to_string()));
        }
        self.get("/v1/route", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_query_with_destination() {
        let upload = FrameUpload {
            image: vec![1, 2, 3],
            location: GeoPoint::new(33.88, -84.27),
            filename: Some("33.88_-84.27_accident".to_string()),
            destination: Some(GeoPoint::new(33.9, -84.2)),
        };
        let query = upload.query();
        assert_eq!(query[0], ("lat", "33.88".to_string()));
        assert_eq!(query[1], ("lon", "-84.27".to_string()));
        assert_eq!(query[2].0, "filename");
        assert_eq!(query[3], ("dest_lat", "33.9".to_string()));
        assert_eq!(query.len(), 5);
    }

    #[test]
    fn test_search_query() {
        assert_eq!(search_query("stalled truck", None), vec![("q", "stalled truck".to_string())]);
        assert_eq!(search_query("fire", Some(5))[1], ("limit", "5".to_string()));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = LookoutClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.url("/v1/health"), "http://localhost:8000/v1/health");
    }
}
