//! Coordinates and route geometry.
//!
//! Distances here are planar, in degrees of latitude/longitude. Over the
//! few kilometres a detour spans this is close enough to rank routes, which
//! is all the planner needs.

use serde::{Deserialize, Serialize};

use crate::error::{LookoutError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn offset(&self, dlat: f64, dlon: f64) -> Self {
        Self::new(self.lat + dlat, self.lon + dlon)
    }

    /// Euclidean distance in degrees.
    pub fn distance_deg(&self, other: &GeoPoint) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        (dlat * dlat + dlon * dlon).sqrt()
    }

    pub fn midpoint(&self, other: &GeoPoint) -> Self {
        Self::new((self.lat + other.lat) / 2.0, (self.lon + other.lon) / 2.0)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Centroid of a set of points, `None` for an empty set.
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    Some(GeoPoint::new(lat, lon))
}

/// Parse `"lat,lon"`.
pub fn parse_point(s: &str) -> Result<GeoPoint> {
    let mut parts = s.split(',').map(str::trim);
    let (lat, lon) = match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lon), None) => (lat, lon),
        _ => {
            return Err(LookoutError::InvalidInput(format!(
                "expected 'lat,lon', got '{}'",
                s
            )))
        }
    };
    let lat: f64 = lat
        .parse()
        .map_err(|_| LookoutError::InvalidInput(format!("bad latitude '{}'", lat)))?;
    let lon: f64 = lon
        .parse()
        .map_err(|_| LookoutError::InvalidInput(format!("bad longitude '{}'", lon)))?;
    let point = GeoPoint::new(lat, lon);
    if !point.is_valid() {
        return Err(LookoutError::InvalidInput(format!(
            "coordinate out of range: {}",
            s
        )));
    }
    Ok(point)
}

/// Parse a semicolon-separated avoid list (`"lat,lon;lat,lon"`).
/// Malformed pairs are skipped rather than rejecting the whole list.
pub fn parse_avoid_list(s: &str) -> Vec<GeoPoint> {
    s.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| parse_point(pair).ok())
        .collect()
}

/// Distance from `p` to the segment `a`-`b`.
pub fn segment_distance(a: &GeoPoint, b: &GeoPoint, p: &GeoPoint) -> f64 {
    let (dlat, dlon) = (b.lat - a.lat, b.lon - a.lon);
    let len2 = dlat * dlat + dlon * dlon;
    if len2 == 0.0 {
        return a.distance_deg(p);
    }
    let t = (((p.lat - a.lat) * dlat + (p.lon - a.lon) * dlon) / len2).clamp(0.0, 1.0);
    GeoPoint::new(a.lat + t * dlat, a.lon + t * dlon).distance_deg(p)
}

/// One route returned by the routing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub coordinates: Vec<GeoPoint>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Closest approach to any avoid-point, in degrees. Set once scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_clearance: Option<f64>,
}

impl RouteCandidate {
    pub fn new(coordinates: Vec<GeoPoint>, distance_meters: f64, duration_seconds: f64) -> Self {
        Self {
            coordinates,
            distance_meters,
            duration_seconds,
            min_clearance: None,
        }
    }

    /// Closest distance from anywhere on the polyline to `point`.
    pub fn closest_approach(&self, point: &GeoPoint) -> Option<f64> {
        match self.coordinates.as_slice() {
            [] => None,
            [only] => Some(only.distance_deg(point)),
            coords => coords
                .windows(2)
                .map(|w| segment_distance(&w[0], &w[1], point))
                .min_by(|a, b| a.total_cmp(b)),
        }
    }
}
