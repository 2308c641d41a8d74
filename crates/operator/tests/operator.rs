//! Whole-operator runs against the in-memory store.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autopsy_core::pod::PHASE_RUNNING;
use autopsy_core::types::Resource;
use autopsy_core::{DiagnosisPhase, ObjectKey, Pod, PodDiagnosis};
use autopsy_operator::runtime::spawn_workers;
use autopsy_operator::{
    BackoffConfig, Collaborators, ControllerError, Operator, OperatorConfig, Reconciler, WorkQueue,
};
use autopsy_reasoning::{ReasoningClient, ReasoningConfig};
use autopsy_store::{MemoryStore, ResourceStore};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{crash_looping_pod, ScriptedReasoner, SAMPLE_LOGS};

fn fast_config() -> OperatorConfig {
    OperatorConfig {
        poll_interval: Duration::from_millis(20),
        worker_count: 2,
        diagnosis_timeout: Duration::from_secs(2),
        ..OperatorConfig::default()
    }
}

fn collaborators(store: &Arc<MemoryStore>, reasoner: Arc<dyn autopsy_reasoning::Reasoner>) -> Collaborators {
    Collaborators {
        store: store.clone(),
        logs: store.clone(),
        events: store.clone(),
        reasoner,
    }
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn phases(store: &MemoryStore) -> Vec<DiagnosisPhase> {
    store.diagnoses().iter().map(PodDiagnosis::phase).collect()
}

fn healthy_pod(name: &str) -> Pod {
    Pod::new("shop", name)
        .with_phase(PHASE_RUNNING)
        .with_running_container(name)
}

#[tokio::test]
async fn pod_failure_is_diagnosed_once() {
    let store = Arc::new(MemoryStore::new());
    let pod = store.upsert_pod(healthy_pod("cart"));
    store.set_logs(&pod.key(), SAMPLE_LOGS);

    let reasoner = Arc::new(ScriptedReasoner::answering("out of memory", "raise the limit"));
    let operator = Operator::start(collaborators(&store, reasoner.clone()), &fast_config());

    // Healthy on first sight: nothing happens.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.diagnoses().is_empty());

    // Rising edge to CrashLoopBackOff.
    let mut failing = crash_looping_pod("cart");
    failing.metadata.uid = pod.metadata.uid.clone();
    store.upsert_pod(failing.clone());

    eventually("completed diagnosis", || phases(&store) == [DiagnosisPhase::Completed]).await;
    let diagnosis = store.diagnoses().remove(0);
    assert_eq!(diagnosis.spec.pod_name, "cart");
    assert_eq!(diagnosis.status.root_cause, "out of memory");
    assert_eq!(diagnosis.metadata.owner_references.len(), 1);
    eventually("diagnosis event", || store.events().len() == 1).await;

    // Staying failed is not a new edge.
    store.upsert_pod(failing);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.diagnoses().len(), 1);
    assert_eq!(reasoner.calls().len(), 1);

    let started = Instant::now();
    operator.shutdown(Duration::from_secs(2)).await;
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn pending_diagnosis_from_previous_run_is_picked_up() {
    let store = Arc::new(MemoryStore::new());
    let crashed = store.upsert_pod(crash_looping_pod("cart"));
    store.set_logs(&crashed.key(), SAMPLE_LOGS);
    let leftover = store
        .create_diagnosis(&PodDiagnosis::for_pod(&crashed))
        .await
        .unwrap();

    // The pod has recovered since, so the detector stays quiet.
    let mut recovered = healthy_pod("cart");
    recovered.metadata.uid = crashed.metadata.uid.clone();
    store.upsert_pod(recovered);

    let reasoner = Arc::new(ScriptedReasoner::answering("bad config", "fix the env"));
    let operator = Operator::start(collaborators(&store, reasoner.clone()), &fast_config());

    eventually("leftover diagnosis completed", || {
        phases(&store) == [DiagnosisPhase::Completed]
    })
    .await;
    let diagnosis = store.get_diagnosis(&leftover.key()).await.unwrap().unwrap();
    assert_eq!(diagnosis.status.suggestion, "fix the env");
    assert_eq!(reasoner.calls().len(), 1);

    operator.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn reasoning_endpoint_error_fails_the_diagnosis() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ReasoningClient::new(ReasoningConfig::with_endpoint(
        format!("http://{addr}/v1/chat/completions"),
        "sk-test",
    ))
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let pod = store.upsert_pod(crash_looping_pod("cart"));
    store.set_logs(&pod.key(), SAMPLE_LOGS);

    let operator = Operator::start(collaborators(&store, Arc::new(client)), &fast_config());

    eventually("failed diagnosis", || phases(&store) == [DiagnosisPhase::Failed]).await;
    let diagnosis = store.diagnoses().remove(0);
    assert!(diagnosis.status.root_cause.starts_with("diagnosis failed: "));
    assert!(diagnosis.status.root_cause.contains("500"));
    assert!(store.events().is_empty());

    operator.shutdown(Duration::from_secs(2)).await;
}

// -- worker pool --

#[derive(Default)]
struct Probe {
    active: Mutex<HashSet<ObjectKey>>,
    overlaps: AtomicUsize,
    passes: AtomicUsize,
}

#[async_trait]
impl Reconciler for Probe {
    type Outcome = ();

    fn name(&self) -> &'static str {
        "probe"
    }

    async fn reconcile(
        &self,
        key: &ObjectKey,
        _cancel: &CancellationToken,
    ) -> Result<(), ControllerError> {
        if !self.active.lock().unwrap().insert(key.clone()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.lock().unwrap().remove(key);
        self.passes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_key_is_never_reconciled_twice_at_once() {
    let queue = WorkQueue::new(BackoffConfig::default());
    let probe = Arc::new(Probe::default());
    let cancel = CancellationToken::new();
    let handles = spawn_workers(probe.clone(), &queue, 4, &cancel);

    let keys: Vec<ObjectKey> = ["a", "b", "c"]
        .into_iter()
        .map(|name| ObjectKey::new("shop", name))
        .collect();
    for _ in 0..20 {
        for key in &keys {
            queue.add(key.clone());
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    eventually("queue drained", || {
        queue.is_empty() && keys.iter().all(|k| !queue.is_processing(k))
    })
    .await;

    assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
    assert!(probe.passes.load(Ordering::SeqCst) >= keys.len());

    queue.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
}
