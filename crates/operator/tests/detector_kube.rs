//! `FailureDetector` over `KubeClient` against a fake API server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use autopsy_core::ObjectKey;
use autopsy_operator::{DetectOutcome, FailureDetector};
use autopsy_store::{KubeClient, KubeConfig};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

type Diagnoses = Arc<Mutex<Vec<Value>>>;

async fn get_pod() -> Json<Value> {
    Json(json!({
        "metadata": {"name": "cart", "namespace": "shop", "uid": "uid-cart", "resourceVersion": "3"},
        "status": {"phase": "Failed"}
    }))
}

async fn list_diagnoses(
    State(stored): State<Diagnoses>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let items: Vec<Value> = stored
        .lock()
        .unwrap()
        .iter()
        .filter(|d| match query.get("labelSelector").and_then(|s| s.split_once('=')) {
            Some((key, value)) => d["metadata"]["labels"][key] == value,
            None => true,
        })
        .cloned()
        .collect();
    Json(json!({ "items": items }))
}

async fn create_diagnosis(
    State(stored): State<Diagnoses>,
    Json(mut body): Json<Value>,
) -> impl IntoResponse {
    let mut stored = stored.lock().unwrap();
    body["metadata"]["name"] = json!(format!("cart-diagnosis-{}", stored.len()));
    body["metadata"]["resourceVersion"] = json!("10");
    stored.push(body.clone());
    (StatusCode::CREATED, Json(body))
}

async fn start(stored: Diagnoses) -> KubeClient {
    let app = Router::new()
        .route("/api/v1/namespaces/{ns}/pods/{name}", get(get_pod))
        .route(
            "/apis/diagnostic.sre.example.com/v1/namespaces/{ns}/poddiagnoses",
            get(list_diagnoses).post(create_diagnosis),
        )
        .with_state(stored);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    KubeClient::new(KubeConfig {
        api_server: format!("http://{addr}"),
        token: None,
        ca_pem: None,
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn unlabelled_pending_request_blocks_a_duplicate() {
    let stored: Diagnoses = Arc::new(Mutex::new(vec![json!({
        "apiVersion": "diagnostic.sre.example.com/v1",
        "kind": "PodDiagnosis",
        "metadata": {"name": "manual-cart", "namespace": "shop", "resourceVersion": "5"},
        "spec": {"podName": "cart", "namespace": "shop"},
        "status": {}
    })]));
    let client = start(Arc::clone(&stored)).await;

    let outcome = FailureDetector::new(Arc::new(client))
        .reconcile_pod(&ObjectKey::new("shop", "cart"))
        .await
        .unwrap();

    assert_matches!(outcome, DetectOutcome::AlreadyDiagnosing { existing } if existing == "manual-cart");
    assert_eq!(stored.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_pod_without_requests_gets_one() {
    let stored: Diagnoses = Arc::default();
    let client = start(Arc::clone(&stored)).await;

    let outcome = FailureDetector::new(Arc::new(client))
        .reconcile_pod(&ObjectKey::new("shop", "cart"))
        .await
        .unwrap();

    assert_matches!(outcome, DetectOutcome::Created { .. });
    let stored = stored.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["spec"]["podName"], "cart");
}
