//! OSRM HTTP client.

use async_trait::async_trait;
use lookout_shared::{GeoPoint, LookoutError, Result, RouteCandidate};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::RouteProvider;

const SERVICE: &str = "routing service";

pub struct OsrmClient {
    http: reqwest::Client,
    base_url: String,
    rate_limit_retry: Duration,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: [lon, lat]
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

impl From<OsrmRoute> for RouteCandidate {
    fn from(route: OsrmRoute) -> Self {
        let coordinates = route
            .geometry
            .coordinates
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| GeoPoint::new(c[1], c[0]))
            .collect();
        let distance = route.legs.iter().map(|l| l.distance).sum();
        let duration = route.legs.iter().map(|l| l.duration).sum();
        RouteCandidate::new(coordinates, distance, duration)
    }
}

/// Parse an OSRM route response body.
pub fn parse_osrm_response(body: &str) -> Result<Vec<RouteCandidate>> {
    let parsed: OsrmResponse =
        serde_json::from_str(body).map_err(|e| LookoutError::malformed(SERVICE, e))?;

    if parsed.code != "Ok" || parsed.routes.is_empty() {
        debug!("OSRM answered code={} with {} routes", parsed.code, parsed.routes.len());
        return Err(LookoutError::NoRouteFound);
    }
    Ok(parsed.routes.into_iter().map(RouteCandidate::from).collect())
}

/// `lon,lat;lon,lat;...`
pub fn format_waypoints(waypoints: &[GeoPoint]) -> String {
    waypoints
        .iter()
        .map(|p| format!("{},{}", p.lon, p.lat))
        .collect::<Vec<_>>()
        .join(";")
}

impl OsrmClient {
    pub fn new(base_url: &str, timeout: Duration, rate_limit_retry: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit_retry,
        })
    }

    fn route_url(&self, waypoints: &[GeoPoint]) -> String {
        format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson&alternatives=true",
            self.base_url,
            format_waypoints(waypoints)
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))
    }
}

#[async_trait]
impl RouteProvider for OsrmClient {
    async fn routes(&self, waypoints: &[GeoPoint]) -> Result<Vec<RouteCandidate>> {
        if waypoints.len() < 2 {
            return Err(LookoutError::InvalidInput(
                "a route needs at least two waypoints".to_string(),
            ));
        }

        let url = self.route_url(waypoints);
        let mut response = self.get(&url).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(
                "Routing service rate limited, retrying once in {:?}",
                self.rate_limit_retry
            );
            tokio::time::sleep(self.rate_limit_retry).await;
            response = self.get(&url).await?;
        }

        if !response.status().is_success() {
            return Err(LookoutError::unavailable(
                SERVICE,
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookoutError::unavailable(SERVICE, e))?;
        parse_osrm_response(&body)
    }
}
