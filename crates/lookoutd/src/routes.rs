//! API routes for lookoutd

use crate::pipeline::FrameRequest;
use crate::server::AppState;
use crate::store::MAX_RECENT;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lookout_shared::{
    parse_avoid_list, FrameReport, GeoPoint, HealthResponse, Incident, LookoutError,
    RouteCandidate, SearchHit, VERSION,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, String);

/// Default page size for incident listings
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Default number of free-text search results
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

fn error_response(e: LookoutError) -> ApiError {
    let status = match &e {
        LookoutError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LookoutError::NoRouteFound => StatusCode::NOT_FOUND,
        LookoutError::ServiceUnavailable { .. } | LookoutError::MalformedResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        LookoutError::Persistence(_) | LookoutError::Io(_) | LookoutError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (status, e.to_string())
}

fn checked_point(lat: f64, lon: f64, what: &str) -> Result<GeoPoint, ApiError> {
    let point = GeoPoint::new(lat, lon);
    if !point.is_valid() {
        return Err(error_response(LookoutError::InvalidInput(format!(
            "{} out of range: {},{}",
            what, lat, lon
        ))));
    }
    Ok(point)
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        vector_backend: state.pipeline.vectors().backend(),
    })
}

// ============================================================================
// Frames
// ============================================================================

pub fn frame_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/frames", post(process_frame))
}

#[derive(Debug, Deserialize)]
struct FrameParams {
    lat: f64,
    lon: f64,
    filename: Option<String>,
    dest_lat: Option<f64>,
    dest_lon: Option<f64>,
}

async fn process_frame(
    State(state): State<AppStateArc>,
    Query(params): Query<FrameParams>,
    body: Bytes,
) -> Result<Json<FrameReport>, ApiError> {
    if body.is_empty() {
        return Err(error_response(LookoutError::InvalidInput(
            "empty frame body".to_string(),
        )));
    }

    let location = checked_point(params.lat, params.lon, "location")?;
    let mut request = FrameRequest::new(body.to_vec(), location);
    if let Some(filename) = params.filename.filter(|f| !f.trim().is_empty()) {
        request = request.with_filename(filename);
    }
    match (params.dest_lat, params.dest_lon) {
        (Some(lat), Some(lon)) => {
            request = request.with_destination(checked_point(lat, lon, "destination")?);
        }
        (None, None) => {}
        _ => {
            return Err(error_response(LookoutError::InvalidInput(
                "dest_lat and dest_lon must be given together".to_string(),
            )))
        }
    }

    info!("Processing frame at {},{}", location.lat, location.lon);
    let report = state
        .pipeline
        .process_frame(request)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

// ============================================================================
// Incidents
// ============================================================================

pub fn incident_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/incidents", get(list_incidents))
        .route("/v1/incidents/:id", get(get_incident))
        .route("/v1/incidents/:id/frame", get(get_frame))
        .route("/v1/search", get(search_incidents))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_incidents(
    State(state): State<AppStateArc>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let incidents = state
        .pipeline
        .store()
        .recent(limit)
        .await
        .map_err(error_response)?;
    Ok(Json(incidents))
}

async fn get_incident(
    State(state): State<AppStateArc>,
    Path(id): Path<i64>,
) -> Result<Json<Incident>, ApiError> {
    state
        .pipeline
        .store()
        .get(id)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Incident {} not found", id)))
}

async fn get_frame(
    State(state): State<AppStateArc>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    // Path comes from the incident id, never from the request
    let bytes = state
        .pipeline
        .frame(id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No frame for incident {}", id)))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

async fn search_incidents(
    State(state): State<AppStateArc>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(error_response(LookoutError::InvalidInput(
            "empty search query".to_string(),
        )));
    }
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_RECENT);

    info!("Searching incidents for '{}'", query);
    let hits = state
        .pipeline
        .search_text(query, limit)
        .await
        .map_err(error_response)?;
    Ok(Json(hits))
}

// ============================================================================
// Standalone routing
// ============================================================================

pub fn route_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/route", get(plan_route))
}

#[derive(Debug, Deserialize)]
struct RouteParams {
    from_lat: f64,
    from_lng: f64,
    to_lat: f64,
    to_lng: f64,
    avoid: Option<String>,
}

async fn plan_route(
    State(state): State<AppStateArc>,
    Query(params): Query<RouteParams>,
) -> Result<Json<RouteCandidate>, ApiError> {
    let origin = checked_point(params.from_lat, params.from_lng, "origin")?;
    let destination = checked_point(params.to_lat, params.to_lng, "destination")?;
    let avoid = params
        .avoid
        .as_deref()
        .map(parse_avoid_list)
        .unwrap_or_default();

    info!(
        "Planning route {},{} -> {},{} avoiding {} points",
        origin.lat,
        origin.lon,
        destination.lat,
        destination.lon,
        avoid.len()
    );
    let route = state
        .pipeline
        .planner()
        .plan(origin, destination, &avoid)
        .await
        .map_err(error_response)?;
    Ok(Json(route))
}
