//! Route planning around incidents.

pub mod osrm;
pub mod planner;

pub use osrm::OsrmClient;
pub use planner::{score_route, RoutePlanner, AVOIDANCE_RADIUS_DEG};

use async_trait::async_trait;
use lookout_shared::{GeoPoint, Result, RouteCandidate};

/// Contract the planner needs from a routing service.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Route alternatives through the ordered waypoints (at least two).
    /// `Err(NoRouteFound)` when the service answers but has no route.
    async fn routes(&self, waypoints: &[GeoPoint]) -> Result<Vec<RouteCandidate>>;
}
