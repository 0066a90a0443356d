//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::routes::sagas::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use domain::DefinitionRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use result_store::InMemoryResultStore;
use saga::{CoordinatorConfig, SagaCoordinator};
use task_channel::{ChannelConfig, InMemoryTaskChannel};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// An app whose coordinator has the purchase definition registered but no
/// workers attached, so started instances stay predictably in `Running`.
fn static_app() -> Router {
    let channel = InMemoryTaskChannel::new(ChannelConfig::default());
    let store = InMemoryResultStore::new();

    let mut registry = DefinitionRegistry::new();
    registry.register(purchase::definition());

    let coordinator = Arc::new(SagaCoordinator::new(
        store,
        channel,
        Arc::new(registry),
        CoordinatorConfig::default(),
    ));
    let state = Arc::new(AppState { coordinator });
    api::create_app(state, metrics_handle())
}

fn start_request(business_key: &str) -> serde_json::Value {
    serde_json::json!({
        "definition": "purchase",
        "business_key": business_key,
        "input": {
            "customerId": "BCCNCL",
            "accountId": "BCCNCL",
            "productCodes": "P-001,P-002",
            "amount": "2500"
        }
    })
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let app = static_app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = static_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_start_saga_returns_accepted() {
    let app = static_app();

    let (status, body) = post_json(&app, "/sagas", start_request("O-001")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "Running");

    let instance_id = body["instance_id"].as_str().unwrap().to_string();
    let (status, body) = get_json(&app, &format!("/sagas/{instance_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Running");
    assert_eq!(body["business_key"], "O-001");
    assert_eq!(body["definition"], "purchase");
    assert_eq!(body["context"]["businessKey"], "O-001");
}

#[tokio::test]
async fn test_duplicate_business_key_conflicts() {
    let app = static_app();

    let (status, _) = post_json(&app, "/sagas", start_request("O-001")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = post_json(&app, "/sagas", start_request("O-001")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("duplicate business key"));
}

#[tokio::test]
async fn test_unknown_definition_is_not_found() {
    let app = static_app();

    let request = serde_json::json!({
        "definition": "deposit",
        "business_key": "O-001"
    });
    let (status, body) = post_json(&app, "/sagas", request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("deposit"));
}

#[tokio::test]
async fn test_invalid_and_unknown_instance_ids() {
    let app = static_app();

    let (status, _) = get_json(&app, "/sagas/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&app, &format!("/sagas/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_abort_compensates_running_instance() {
    let app = static_app();

    let (_, body) = post_json(&app, "/sagas", start_request("O-001")).await;
    let instance_id = body["instance_id"].as_str().unwrap().to_string();

    let (status, body) = post_json(&app, &format!("/sagas/{instance_id}/abort"), serde_json::Value::Null).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    // Nothing had succeeded yet, so the unwind finishes immediately.
    assert_eq!(body["status"], "Compensated");

    // A second abort is rejected: the instance is terminal.
    let (status, _) = post_json(&app, &format!("/sagas/{instance_id}/abort"), serde_json::Value::Null).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_purchase_flow_over_http() {
    let (state, runtime) = api::start_default_runtime(&Config::default()).await;
    let app = api::create_app(state, metrics_handle());

    let (status, body) = post_json(&app, "/sagas", start_request("O-100")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let instance_id = body["instance_id"].as_str().unwrap().to_string();

    // Poll the status endpoint until the saga reaches a terminal state.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let final_status = loop {
        let (status, body) = get_json(&app, &format!("/sagas/{instance_id}")).await;
        assert_eq!(status, StatusCode::OK);
        let saga_status = body["status"].as_str().unwrap().to_string();
        if saga_status != "Running" && saga_status != "Compensating" {
            break saga_status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "saga did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(final_status, "Completed");

    let (status, body) = get_json(&app, &format!("/sagas/{instance_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"]["paymentId"], "PAY-0001");
    assert_eq!(body["context"]["reservationId"], "RES-0001");

    let (status, steps) = get_json(&app, &format!("/sagas/{instance_id}/steps")).await;
    assert_eq!(status, StatusCode::OK);
    let steps = steps.as_array().unwrap();
    assert_eq!(steps.len(), 6);
    assert!(steps.iter().all(|step| step["status"] == "Succeeded"));
    assert_eq!(steps[0]["task_kind"], "check-fraud");
    assert_eq!(steps[5]["task_kind"], "confirm-order");

    runtime.shutdown().await;
}
