//! Avoidance planner.
//!
//! Asks the routing service for the direct route plus detours through
//! waypoints pushed sideways off the midpoint, then keeps the candidate that
//! best clears every avoid-point without an excessive detour.

use lookout_shared::{centroid, GeoPoint, LookoutError, Result, RouteCandidate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::RouteProvider;

/// A route passing closer than this (~330 m) to an avoid-point hits it.
pub const AVOIDANCE_RADIUS_DEG: f64 = 0.003;

/// Detour offsets on the side away from the incidents (~4.5, 9, 14 km).
pub const PREFERRED_OFFSETS_DEG: [f64; 3] = [0.04, 0.08, 0.13];

/// Single detour offset on the side facing the incidents (~6.5 km).
pub const OPPOSITE_OFFSET_DEG: f64 = 0.06;

/// Any clearing route beats every non-clearing one.
pub const CLEARANCE_BONUS: f64 = 1000.0;

pub const DURATION_WEIGHT: f64 = 0.5;

/// `(clears ? 1000 : 0) + min_clearance - 0.5 * duration_ratio`
pub fn score_route(min_clearance: f64, duration_ratio: f64) -> f64 {
    let bonus = if min_clearance > AVOIDANCE_RADIUS_DEG {
        CLEARANCE_BONUS
    } else {
        0.0
    };
    bonus + min_clearance - DURATION_WEIGHT * duration_ratio
}

/// Smallest closest-approach over all avoid-points.
pub fn min_clearance(candidate: &RouteCandidate, avoid: &[GeoPoint]) -> Option<f64> {
    avoid
        .iter()
        .filter_map(|p| candidate.closest_approach(p))
        .min_by(|a, b| a.total_cmp(b))
}

/// One intermediate waypoint per detour: three on the side away from the
/// avoid-point centroid, one on the near side.
pub fn detour_waypoints(origin: &GeoPoint, destination: &GeoPoint, avoid: &[GeoPoint]) -> Vec<GeoPoint> {
    let Some(center) = centroid(avoid) else {
        return Vec::new();
    };

    let dlat = destination.lat - origin.lat;
    let dlon = destination.lon - origin.lon;
    let mut len = (dlat * dlat + dlon * dlon).sqrt();
    if len == 0.0 {
        len = 1e-9;
    }
    // Unit perpendicular to the direct line
    let (plat, plon) = (-dlon / len, dlat / len);

    let toward = (center.lat - origin.lat) * plat + (center.lon - origin.lon) * plon;
    let away = if toward >= 0.0 { -1.0 } else { 1.0 };

    let mid = origin.midpoint(destination);
    let mut waypoints: Vec<GeoPoint> = PREFERRED_OFFSETS_DEG
        .iter()
        .map(|off| mid.offset(away * off * plat, away * off * plon))
        .collect();
    waypoints.push(mid.offset(
        -away * OPPOSITE_OFFSET_DEG * plat,
        -away * OPPOSITE_OFFSET_DEG * plon,
    ));
    waypoints
}

pub struct RoutePlanner {
    provider: Arc<dyn RouteProvider>,
    pacing: Duration,
}

impl RoutePlanner {
    /// `pacing` is the pause between consecutive detour queries.
    pub fn new(provider: Arc<dyn RouteProvider>, pacing: Duration) -> Self {
        Self { provider, pacing }
    }

    /// Best route from `origin` to `destination` staying clear of `avoid`.
    pub async fn plan(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        avoid: &[GeoPoint],
    ) -> Result<RouteCandidate> {
        let mut last_error: Option<LookoutError> = None;

        let direct = match self.provider.routes(&[origin, destination]).await {
            Ok(routes) => routes,
            Err(e) => {
                warn!("Direct route query failed: {}", e);
                last_error = Some(e);
                Vec::new()
            }
        };

        if avoid.is_empty() {
            return direct
                .into_iter()
                .next()
                .ok_or_else(|| last_error.unwrap_or(LookoutError::NoRouteFound));
        }

        let baseline = direct
            .first()
            .map(|r| r.duration_seconds)
            .filter(|d| *d > 0.0);

        let mut pool = direct;
        let waypoints = detour_waypoints(&origin, &destination, avoid);
        for (i, via) in waypoints.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            match self.provider.routes(&[origin, *via, destination]).await {
                Ok(routes) => {
                    debug!("Detour {} returned {} routes", i + 1, routes.len());
                    pool.extend(routes);
                }
                Err(e) => {
                    warn!("Detour {} query failed: {}", i + 1, e);
                    last_error = Some(e);
                }
            }
        }

        let mut best: Option<(f64, RouteCandidate)> = None;
        for mut candidate in pool {
            let Some(clearance) = min_clearance(&candidate, avoid) else {
                continue;
            };
            let ratio = match baseline {
                Some(base) => candidate.duration_seconds / base,
                None => 1.0,
            };
            let score = score_route(clearance, ratio);
            candidate.min_clearance = Some(clearance);

            // Strictly greater keeps the first-enumerated candidate on ties
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((score, route)) => {
                info!(
                    "Chose route: {:.0}s, {:.0}m, clearance {:.4} deg (score {:.3})",
                    route.duration_seconds,
                    route.distance_meters,
                    route.min_clearance.unwrap_or_default(),
                    score
                );
                Ok(route)
            }
            None => Err(last_error.unwrap_or(LookoutError::NoRouteFound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRouteProvider;
    use approx::assert_relative_eq;

    fn line(points: &[(f64, f64)], duration: f64) -> RouteCandidate {
        RouteCandidate::new(
            points.iter().map(|(lat, lon)| GeoPoint::new(*lat, *lon)).collect(),
            1000.0,
            duration,
        )
    }

    #[test]
    fn test_score_prefers_clearance_at_equal_duration() {
        assert!(score_route(0.02, 1.0) > score_route(0.01, 1.0));
        assert!(score_route(0.002, 1.0) > score_route(0.001, 1.0));
    }

    #[test]
    fn test_score_clearing_beats_non_clearing() {
        // Even a slow clearing route outranks a fast one through the incident
        assert!(score_route(0.0031, 3.0) > score_route(0.0029, 1.0));
        assert!(score_route(0.004, 10.0) > score_route(0.0, 0.5));
    }

    #[test]
    fn test_detour_waypoints_push_away_from_incident() {
        // Direct line runs north; incident sits east of it
        let origin = GeoPoint::new(0.0, 0.0);
        let dest = GeoPoint::new(1.0, 0.0);
        let avoid = [GeoPoint::new(0.5, 0.01)];

        let wps = detour_waypoints(&origin, &dest, &avoid);
        assert_eq!(wps.len(), 4);
        for wp in &wps[..3] {
            assert!(wp.lon < 0.0, "preferred detour should go west: {:?}", wp);
            assert_relative_eq!(wp.lat, 0.5);
        }
        assert_relative_eq!(wps[0].lon, -0.04);
        assert_relative_eq!(wps[2].lon, -0.13);
        assert_relative_eq!(wps[3].lon, 0.06);
    }

    #[test]
    fn test_detour_waypoints_empty_avoid() {
        let p = GeoPoint::new(1.0, 1.0);
        assert!(detour_waypoints(&p, &p, &[]).is_empty());
    }

    #[tokio::test]
    async fn test_plan_without_avoid_returns_first_direct() {
        let provider = Arc::new(FakeRouteProvider::from_fn(|_| {
            Ok(vec![line(&[(0.0, 0.0), (1.0, 0.0)], 100.0), line(&[(0.0, 0.0), (1.0, 1.0)], 50.0)])
        }));
        let planner = RoutePlanner::new(provider.clone(), Duration::ZERO);

        let route = planner
            .plan(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0), &[])
            .await
            .unwrap();
        assert_eq!(route.duration_seconds, 100.0);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_plan_picks_clearing_detour() {
        let origin = GeoPoint::new(0.0, 0.0);
        let dest = GeoPoint::new(0.02, 0.0);
        let incident = GeoPoint::new(0.01, 0.0);

        let provider = Arc::new(FakeRouteProvider::from_fn(|wps| {
            if wps.len() == 2 {
                // Direct route drives straight through the incident
                Ok(vec![line(&[(0.0, 0.0), (0.01, 0.0), (0.02, 0.0)], 100.0)])
            } else {
                // Wider detours take longer
                let via = wps[1];
                let duration = 100.0 + via.lon.abs() * 1000.0;
                Ok(vec![line(&[(0.0, 0.0), (via.lat, via.lon), (0.02, 0.0)], duration)])
            }
        }));
        let planner = RoutePlanner::new(provider.clone(), Duration::ZERO);

        let route = planner.plan(origin, dest, &[incident]).await.unwrap();
        let clearance = route.min_clearance.unwrap();
        assert!(clearance > AVOIDANCE_RADIUS_DEG);
        // Direct + four detours
        assert_eq!(provider.calls(), 5);
        // All detours clear equally; the quickest one wins
        assert_relative_eq!(route.coordinates[1].lon, -0.04, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_plan_survives_failed_baseline() {
        let provider = Arc::new(FakeRouteProvider::from_fn(|wps| {
            if wps.len() == 2 {
                Err(LookoutError::unavailable("routing service", "HTTP 503"))
            } else {
                Ok(vec![line(&[(0.0, 0.0), (wps[1].lat, wps[1].lon), (0.02, 0.0)], 300.0)])
            }
        }));
        let planner = RoutePlanner::new(provider, Duration::ZERO);

        let route = planner
            .plan(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.02, 0.0), &[GeoPoint::new(0.01, 0.0)])
            .await
            .unwrap();
        assert!(route.min_clearance.unwrap() > AVOIDANCE_RADIUS_DEG);
    }

    #[tokio::test]
    async fn test_plan_no_routes() {
        let provider = Arc::new(FakeRouteProvider::from_fn(|_| Err(LookoutError::NoRouteFound)));
        let planner = RoutePlanner::new(provider, Duration::ZERO);

        let err = planner
            .plan(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0), &[GeoPoint::new(0.5, 0.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LookoutError::NoRouteFound));
    }

    #[tokio::test]
    async fn test_plan_tie_keeps_first() {
        let provider = Arc::new(FakeRouteProvider::from_fn(|_| {
            Ok(vec![
                line(&[(0.0, 1.0), (1.0, 1.0)], 100.0),
                line(&[(0.0, -1.0), (1.0, -1.0)], 100.0),
            ])
        }));
        let planner = RoutePlanner::new(provider, Duration::ZERO);

        let route = planner
            .plan(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0), &[GeoPoint::new(0.5, 0.0)])
            .await
            .unwrap();
        assert_eq!(route.coordinates[0], GeoPoint::new(0.0, 1.0));
    }
}
