//! OSRM client against a scripted local routing server.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use lookout_shared::{GeoPoint, LookoutError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lookoutd::routing::{OsrmClient, RouteProvider};

const ROUTE_BODY: &str = r#"{
    "code": "Ok",
    "routes": [
        {
            "geometry": {"type": "LineString", "coordinates": [[-84.39, 33.75], [-84.37, 33.77]]},
            "legs": [{"distance": 2500.0, "duration": 200.0}]
        }
    ]
}"#;

struct Script {
    statuses: Mutex<VecDeque<StatusCode>>,
    hits: AtomicUsize,
}

async fn answer(State(script): State<Arc<Script>>) -> (StatusCode, String) {
    script.hits.fetch_add(1, Ordering::SeqCst);
    let status = script
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::OK);
    if status == StatusCode::OK {
        (status, ROUTE_BODY.to_string())
    } else {
        (status, "slow down".to_string())
    }
}

/// Serve the scripted statuses in order and return a client pointed at them.
async fn scripted(statuses: &[StatusCode]) -> (OsrmClient, Arc<Script>) {
    let script = Arc::new(Script {
        statuses: Mutex::new(statuses.iter().copied().collect()),
        hits: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route("/route/v1/driving/*waypoints", get(answer))
        .with_state(script.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = OsrmClient::new(
        &format!("http://{}", addr),
        Duration::from_secs(5),
        Duration::from_millis(1),
    )
    .unwrap();
    (client, script)
}

fn trip() -> [GeoPoint; 2] {
    [GeoPoint::new(33.75, -84.39), GeoPoint::new(33.77, -84.37)]
}

#[tokio::test]
async fn test_rate_limit_is_retried_once() {
    let (client, script) = scripted(&[StatusCode::TOO_MANY_REQUESTS, StatusCode::OK]).await;

    let routes = client.routes(&trip()).await.unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].distance_meters, 2500.0);
    assert_eq!(script.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_second_rate_limit_gives_up() {
    let (client, script) = scripted(&[
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::OK,
    ])
    .await;

    let err = client.routes(&trip()).await.unwrap_err();
    assert!(matches!(err, LookoutError::ServiceUnavailable { .. }));
    assert_eq!(script.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let (client, script) = scripted(&[StatusCode::INTERNAL_SERVER_ERROR, StatusCode::OK]).await;

    let err = client.routes(&trip()).await.unwrap_err();
    assert!(matches!(err, LookoutError::ServiceUnavailable { .. }));
    assert_eq!(script.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ok_on_first_request() {
    let (client, script) = scripted(&[]).await;

    let routes = client.routes(&trip()).await.unwrap();
    assert_eq!(routes[0].coordinates[0], GeoPoint::new(33.75, -84.39));
    assert_eq!(script.hits.load(Ordering::SeqCst), 1);
}
