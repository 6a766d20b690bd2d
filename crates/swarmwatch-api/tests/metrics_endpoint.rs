//! Router-level tests for the exporter's HTTP surface.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use swarmwatch_api::build_router;
use swarmwatch_metrics::{GaugeStore, Labels};
use tower::ServiceExt;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, String, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();

    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn metrics_exposes_both_families_with_sanitized_custom_labels() {
    let gauges = GaugeStore::new(&["com.example.team".to_string()]).unwrap();
    gauges
        .set_desired_replicas(
            &labels(&[
                ("stack", "shop"),
                ("service", "shop_web"),
                ("service_mode", "replicated"),
                ("service_version", "9"),
                ("com.example.team", "payments"),
            ]),
            3.0,
        )
        .unwrap();
    gauges
        .set_replicas_state(
            &labels(&[
                ("stack", "shop"),
                ("service", "shop_web"),
                ("service_mode", "replicated"),
                ("state", "running"),
                ("com.example.team", "payments"),
            ]),
            2.0,
        )
        .unwrap();

    let (status, content_type, body) = get(build_router(gauges), "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/plain; version=0.0.4"), "{content_type}");
    assert!(body.contains("# TYPE swarm_service_desired_replicas gauge"), "{body}");
    assert!(body.contains("# TYPE swarm_service_replicas_state gauge"), "{body}");
    assert!(body.contains("com_example_team=\"payments\""), "{body}");
    assert!(body.contains("service_version=\"9\""), "{body}");
    assert!(body.contains("state=\"running\""), "{body}");
}

#[tokio::test]
async fn metrics_before_any_publication_is_empty_but_ok() {
    let gauges = GaugeStore::new(&[]).unwrap();
    let (status, _, body) = get(build_router(gauges), "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("swarm_service_desired_replicas{"));
}

#[tokio::test]
async fn healthz_answers_ok() {
    let gauges = GaugeStore::new(&[]).unwrap();
    let (status, _, body) = get(build_router(gauges), "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let gauges = GaugeStore::new(&[]).unwrap();
    let (status, _, _) = get(build_router(gauges), "/services").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
