//! End-to-end pipeline runs against in-process doubles.
//!
//! Every collaborator is a fake from `lookoutd::testing`, so these tests
//! exercise the stage ordering and the degradation paths without network.

use approx::assert_relative_eq;
use lookout_shared::{
    Action, Classification, ClassificationSource, Decision, DecisionSource, EmbeddingSource,
    EventType, GeoPoint, LookoutError, MatchMetadata, VectorBackend,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lookoutd::embedding::Embedder;
use lookoutd::frames::FrameArchive;
use lookoutd::pipeline::{FrameRequest, Pipeline};
use lookoutd::reasoner::DecisionEngine;
use lookoutd::routing::RoutePlanner;
use lookoutd::store::IncidentStore;
use lookoutd::testing::{FakeClassifier, FakeEmbeddingProvider, FakeReasoner, FakeRouteProvider};
use lookoutd::vector::VectorStore;

const DIM: usize = 8;

fn accident(confidence: f64, rating: u8, blocked_lanes: u32) -> Classification {
    Classification {
        event_type: EventType::Accident,
        confidence,
        vehicles_detected: 2,
        blocked_lanes,
        rating,
        description: "Two-car collision in the right lane".to_string(),
    }
}

fn constant_embedder() -> (Arc<FakeEmbeddingProvider>, Embedder) {
    let provider = Arc::new(FakeEmbeddingProvider::returning(vec![0.5; DIM]));
    let embedder = Embedder::new(provider.clone(), DIM, 0);
    (provider, embedder)
}

fn history(confidence: f64, clearance: f64) -> MatchMetadata {
    MatchMetadata {
        event_type: Some("accident".to_string()),
        confidence: Some(confidence),
        rating: Some(7),
        clearance_minutes: Some(clearance),
    }
}

/// Vector store holding prior incidents that all match the constant embedding.
async fn seeded_vectors(prior: &[(i64, f64, f64)]) -> Arc<VectorStore> {
    let vectors = Arc::new(VectorStore::in_memory(DIM));
    vectors.initialize().await;
    for (id, confidence, clearance) in prior {
        vectors
            .upsert(*id, &[0.5; DIM], history(*confidence, *clearance))
            .await;
    }
    vectors
}

fn planner(provider: Arc<FakeRouteProvider>) -> RoutePlanner {
    RoutePlanner::new(provider, Duration::ZERO)
}

fn atlanta() -> GeoPoint {
    GeoPoint::new(33.749, -84.388)
}

#[tokio::test]
async fn test_accident_with_history_reroutes() {
    let classifier = Arc::new(FakeClassifier::returning(accident(0.85, 8, 1)));
    let (embeddings, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());
    let vectors = seeded_vectors(&[(101, 0.7, 10.0), (102, 0.7, 20.0)]).await;
    let store = IncidentStore::open_in_memory().unwrap();

    let pipeline = Pipeline::new(store.clone(), vectors.clone(), planner(routes.clone()))
        .with_classifier(classifier.clone())
        .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(classifier.calls(), 1);
    assert_eq!(embeddings.calls(), 1);

    assert_eq!(report.incident.event_type, EventType::Accident);
    assert_eq!(report.incident.rating, 8);
    // The fresh incident is indexed before the search and matches itself
    assert_eq!(report.similar_incidents.len(), 3);
    assert!(report
        .similar_incidents
        .iter()
        .any(|s| s.id == report.incident.id));
    assert_relative_eq!(report.estimated_clearance_minutes, 15.0);
    assert!(!report.is_false_positive);

    assert_eq!(report.decision.action, Action::Reroute);
    assert_relative_eq!(report.decision.final_confidence, 0.85);
    assert!(report.decision.explanation.starts_with("High severity"));
    assert_eq!(
        report.notification,
        "Accident reported ahead (severity 8/10). Consider alternate route."
    );

    // Direct query plus four detours
    assert_eq!(routes.calls(), 5);
    let route = report.route.expect("reroute should produce a route");
    assert!(route.min_clearance.unwrap() > 0.003);

    assert_eq!(
        report.debug.classification,
        ClassificationSource::Service
    );
    assert_eq!(report.debug.embedding, EmbeddingSource::Provider);
    assert_eq!(report.debug.vector_upsert, VectorBackend::Memory);
    assert_eq!(report.debug.decision, DecisionSource::Rules);

    // Persisted with its notification; indexed for the next frame
    let stored = store.get(report.incident.id).await.unwrap().unwrap();
    assert_eq!(stored.notification, report.notification);
    assert_eq!(vectors.fallback_len(), 3);
}

#[tokio::test]
async fn test_low_confidence_cluster_is_dismissed() {
    let classifier = Arc::new(FakeClassifier::returning(accident(0.5, 8, 1)));
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());
    let vectors = seeded_vectors(&[(1, 0.2, 30.0), (2, 0.25, 30.0), (3, 0.3, 30.0)]).await;

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        vectors,
        planner(routes.clone()),
    )
    .with_classifier(classifier)
    .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert!(report.is_false_positive);
    assert_eq!(report.decision.action, Action::Dismiss);
    assert_relative_eq!(report.decision.final_confidence, 0.15, epsilon = 1e-9);
    assert!(report.route.is_none());
    assert_eq!(routes.calls(), 0);
}

#[tokio::test]
async fn test_own_match_counts_toward_false_positive_cluster() {
    // Priors alone are half low confidence; with the weak new frame it is 2 of 3
    let classifier = Arc::new(FakeClassifier::returning(accident(0.3, 8, 1)));
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());
    let vectors = seeded_vectors(&[(101, 0.2, 20.0), (102, 0.9, 20.0)]).await;

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        vectors,
        planner(routes.clone()),
    )
    .with_classifier(classifier)
    .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(report.similar_incidents.len(), 3);
    assert!(report.is_false_positive);
    assert_eq!(report.decision.action, Action::Dismiss);
    assert!(report.decision.explanation.contains("of 3 similar"));
    assert_eq!(routes.calls(), 0);
}

#[tokio::test]
async fn test_classifier_outage_uses_filename_heuristic() {
    let classifier = Arc::new(FakeClassifier::failing());
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(routes),
    )
    .with_classifier(classifier.clone())
    .with_embedder(embedder);

    let request = FrameRequest::new(b"jpeg".to_vec(), atlanta()).with_filename("crash_i85.jpg");
    let report = pipeline.process_frame(request).await.unwrap();

    assert_eq!(classifier.calls(), 1);
    assert_eq!(classifier.hints(), vec![Some("crash_i85.jpg".to_string())]);
    assert_eq!(report.debug.classification, ClassificationSource::Heuristic);
    assert_eq!(report.incident.event_type, EventType::Accident);
    assert_eq!(report.similar_incidents.len(), 1);
    assert_eq!(report.similar_incidents[0].id, report.incident.id);
    assert_relative_eq!(report.estimated_clearance_minutes, 30.0);
}

#[tokio::test]
async fn test_no_classifier_and_no_hint_is_unknown() {
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(routes.clone()),
    )
    .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(report.incident.event_type, EventType::Unknown);
    assert_eq!(report.decision.action, Action::Monitor);
    assert!(report.decision.explanation.starts_with("Low severity"));
    assert!(report.route.is_none());
    assert_eq!(routes.calls(), 0);
}

#[tokio::test]
async fn test_reasoner_decision_is_used() {
    let reasoner = Arc::new(FakeReasoner::returning(Decision::new(
        Action::Monitor,
        0.6,
        "Shoulder only, traffic flowing",
    )));
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[(7, 0.9, 45.0)]).await,
        planner(routes.clone()),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.9, 9, 2))))
    .with_embedder(embedder)
    .with_decisions(DecisionEngine::new(Some(reasoner.clone())));

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(reasoner.calls(), 1);
    let input = reasoner.last_input().unwrap();
    assert_eq!(input.similar_count, 2);
    assert_relative_eq!(input.estimated_clearance, 45.0);
    assert_eq!(input.blocked_lanes, 2);

    assert_eq!(report.debug.decision, DecisionSource::Reasoner);
    assert_eq!(report.decision.action, Action::Monitor);
    assert!(report.route.is_none());
    assert_eq!(routes.calls(), 0);
}

#[tokio::test]
async fn test_reasoner_failure_falls_back_to_rules() {
    let reasoner = Arc::new(FakeReasoner::failing());
    let (_, embedder) = constant_embedder();

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.85, 8, 1))))
    .with_embedder(embedder)
    .with_decisions(DecisionEngine::new(Some(reasoner.clone())));

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(reasoner.calls(), 1);
    assert_eq!(report.debug.decision, DecisionSource::Rules);
    assert_eq!(report.decision.action, Action::Reroute);
    assert!(report.route.is_some());
}

#[tokio::test]
async fn test_reroute_without_blocked_lanes_skips_routing() {
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(routes.clone()),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.9, 8, 0))))
    .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(report.decision.action, Action::Reroute);
    assert!(report.route.is_none());
    assert_eq!(routes.calls(), 0);
}

#[tokio::test]
async fn test_routing_outage_keeps_decision() {
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::unavailable());

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(routes.clone()),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.85, 8, 1))))
    .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(report.decision.action, Action::Reroute);
    assert!(report.route.is_none());
    assert_eq!(routes.calls(), 5);
}

#[tokio::test]
async fn test_explicit_destination_is_planned_to() {
    let (_, embedder) = constant_embedder();
    let routes = Arc::new(FakeRouteProvider::straight_line());
    let destination = GeoPoint::new(33.8, -84.3);

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(routes.clone()),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.85, 8, 1))))
    .with_embedder(embedder);

    let request = FrameRequest::new(b"jpeg".to_vec(), atlanta()).with_destination(destination);
    let report = pipeline.process_frame(request).await.unwrap();

    assert!(report.route.is_some());
    let first = &routes.requests()[0];
    assert_eq!(first, &vec![atlanta(), destination]);
}

#[tokio::test]
async fn test_embedding_outage_uses_zero_vector() {
    let provider = Arc::new(FakeEmbeddingProvider::failing());
    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.5, 3, 0))))
    .with_embedder(Embedder::new(provider.clone(), DIM, 0));

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(report.debug.embedding, EmbeddingSource::ZeroVector);
    assert_eq!(report.decision.action, Action::Monitor);
}

#[tokio::test]
async fn test_frame_is_archived_under_incident_id() {
    let dir = tempfile::tempdir().unwrap();
    let (_, embedder) = constant_embedder();
    let store = IncidentStore::open_in_memory().unwrap();

    let pipeline = Pipeline::new(
        store.clone(),
        seeded_vectors(&[]).await,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_embedder(embedder)
    .with_frames(FrameArchive::new(dir.path()));

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg-bytes".to_vec(), atlanta()))
        .await
        .unwrap();

    let expected = dir
        .path()
        .join(format!("frame_{}.jpg", report.incident.id));
    let image_path = report.incident.image_path.clone().unwrap();
    assert_eq!(Path::new(&image_path), expected);
    assert_eq!(std::fs::read(&expected).unwrap(), b"jpeg-bytes");

    let stored = store.get(report.incident.id).await.unwrap().unwrap();
    assert_eq!(stored.image_path, Some(image_path));
}

#[tokio::test]
async fn test_persistence_failure_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("incidents.db");
    let store = IncidentStore::open(&db_path).await.unwrap();

    // Break the schema behind the store's back
    let other = rusqlite::Connection::open(&db_path).unwrap();
    other.execute_batch("DROP TABLE incidents").unwrap();
    drop(other);

    let (embeddings, embedder) = constant_embedder();
    let vectors = seeded_vectors(&[]).await;
    let pipeline = Pipeline::new(
        store,
        vectors.clone(),
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_embedder(embedder);

    let err = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap_err();

    assert!(matches!(err, LookoutError::Persistence(_)));
    assert_eq!(embeddings.calls(), 0);
    assert_eq!(vectors.fallback_len(), 0);
}

#[tokio::test]
async fn test_persistence_failure_removes_pending_frame() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("incidents.db");
    let frames_dir = dir.path().join("frames");
    let store = IncidentStore::open(&db_path).await.unwrap();

    let other = rusqlite::Connection::open(&db_path).unwrap();
    other.execute_batch("DROP TABLE incidents").unwrap();
    drop(other);

    let (_, embedder) = constant_embedder();
    let pipeline = Pipeline::new(
        store,
        seeded_vectors(&[]).await,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_embedder(embedder)
    .with_frames(FrameArchive::new(&frames_dir));

    let result = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await;

    assert!(result.is_err());
    let leftover = std::fs::read_dir(&frames_dir).unwrap().count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_text_search_returns_stored_incidents() {
    let (_, embedder) = constant_embedder();
    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[]).await,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.6, 5, 0))))
    .with_embedder(embedder);

    let report = pipeline
        .process_frame(FrameRequest::new(b"jpeg".to_vec(), atlanta()))
        .await
        .unwrap();

    let hits = pipeline.search_text("accidents with trucks", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].incident.id, report.incident.id);
    assert_relative_eq!(hits[0].score, 1.0, epsilon = 1e-6);
}

#[tokio::test]
async fn test_text_search_without_embedding_is_empty() {
    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        seeded_vectors(&[(1, 0.9, 10.0)]).await,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_embedder(Embedder::new(
        Arc::new(FakeEmbeddingProvider::failing()),
        DIM,
        0,
    ));

    assert!(pipeline.search_text("fire", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_frame_finds_the_first() {
    let (_, embedder) = constant_embedder();
    let vectors = seeded_vectors(&[]).await;

    let pipeline = Pipeline::new(
        IncidentStore::open_in_memory().unwrap(),
        vectors,
        planner(Arc::new(FakeRouteProvider::straight_line())),
    )
    .with_classifier(Arc::new(FakeClassifier::returning(accident(0.6, 5, 0))))
    .with_embedder(embedder);

    let first = pipeline
        .process_frame(FrameRequest::new(b"one".to_vec(), atlanta()))
        .await
        .unwrap();
    let second = pipeline
        .process_frame(FrameRequest::new(b"two".to_vec(), atlanta()))
        .await
        .unwrap();

    assert_eq!(first.similar_incidents.len(), 1);
    let ids: Vec<i64> = second.similar_incidents.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first.incident.id, second.incident.id]);
    // Prior incidents carry no clearance yet
    assert_relative_eq!(second.estimated_clearance_minutes, 30.0);
}
