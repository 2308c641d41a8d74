//! Controller runtime: watch pumps, worker pools and operator wiring.
//!
//! Each controller owns a [`WorkQueue`] keyed by object identity. A pump
//! task moves filtered watch events from the bus into the queue and a
//! pool of workers drains it, so distinct objects are reconciled in
//! parallel while one object is never reconciled by two workers at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autopsy_core::watch::{should_reconcile_diagnosis, should_trigger};
use autopsy_core::{ObjectKey, Pod, PodDiagnosis, WatchEvent};
use autopsy_events::{EventBus, Informer, Watched};
use autopsy_reasoning::Reasoner;
use autopsy_store::{EventRecorder, LogSource, ResourceStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::detector::FailureDetector;
use crate::error::ControllerError;
use crate::lifecycle::{DiagnosisController, LifecycleSettings};
use crate::queue::{BackoffConfig, WorkQueue};

/// One reconciliation pass over an object identity.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Outcome: fmt::Debug + Send;

    /// Controller name used in logs.
    fn name(&self) -> &'static str;

    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Self::Outcome, ControllerError>;

    /// Whether a successful outcome still asks for a delayed retry.
    fn wants_retry(&self, _outcome: &Self::Outcome) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Pump and workers
// ---------------------------------------------------------------------------

/// Forward watch events accepted by `filter` into `queue` until cancelled
/// or the bus closes.
pub async fn pump<K: Watched>(
    name: &'static str,
    mut rx: broadcast::Receiver<WatchEvent<K>>,
    queue: Arc<WorkQueue<ObjectKey>>,
    filter: fn(&WatchEvent<K>) -> bool,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => {
                    if filter(&event) {
                        queue.add(event.key());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(controller = name, missed, "Watch subscriber lagged; relying on resync");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Drain `queue` with one worker until the queue shuts down.
pub async fn worker<R: Reconciler>(
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<ObjectKey>>,
    cancel: CancellationToken,
) {
    while let Some(key) = queue.next().await {
        let name = reconciler.name();
        match reconciler.reconcile(&key, &cancel).await {
            Ok(outcome) if reconciler.wants_retry(&outcome) => {
                let delay = queue.requeue_with_backoff(key.clone());
                tracing::info!(
                    controller = name,
                    object = %key,
                    ?outcome,
                    delay_ms = delay.as_millis() as u64,
                    "Retry scheduled",
                );
            }
            Ok(outcome) => {
                queue.forget(&key);
                tracing::debug!(controller = name, object = %key, ?outcome, "Reconciled");
            }
            Err(ControllerError::Cancelled) => {
                tracing::debug!(controller = name, object = %key, "Reconcile cancelled");
            }
            Err(e) => {
                let delay = queue.requeue_with_backoff(key.clone());
                tracing::error!(
                    controller = name,
                    object = %key,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Reconcile failed, requeued",
                );
            }
        }
        queue.done(&key);
    }
}

/// Spawn `count` workers for `reconciler`.
pub fn spawn_workers<R: Reconciler>(
    reconciler: Arc<R>,
    queue: &Arc<WorkQueue<ObjectKey>>,
    count: usize,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            tokio::spawn(worker(
                Arc::clone(&reconciler),
                Arc::clone(queue),
                cancel.clone(),
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// External collaborators of the operator.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ResourceStore>,
    pub logs: Arc<dyn LogSource>,
    pub events: Arc<dyn EventRecorder>,
    pub reasoner: Arc<dyn Reasoner>,
}

/// Running operator: informers, pumps and worker pools for both
/// controllers.
pub struct Operator {
    cancel: CancellationToken,
    pod_queue: Arc<WorkQueue<ObjectKey>>,
    diagnosis_queue: Arc<WorkQueue<ObjectKey>>,
    handles: Vec<JoinHandle<()>>,
}

impl Operator {
    pub fn start(collaborators: Collaborators, config: &OperatorConfig) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        let pod_bus = Arc::new(EventBus::<WatchEvent<Pod>>::default());
        let diagnosis_bus = Arc::new(EventBus::<WatchEvent<PodDiagnosis>>::default());

        let pod_queue = WorkQueue::new(BackoffConfig::default());
        let diagnosis_queue = WorkQueue::new(BackoffConfig::default());

        // Subscribe before the informers publish their initial list.
        handles.push(tokio::spawn(pump(
            "failure-detector",
            pod_bus.subscribe(),
            Arc::clone(&pod_queue),
            should_trigger,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(pump(
            "diagnosis-lifecycle",
            diagnosis_bus.subscribe(),
            Arc::clone(&diagnosis_queue),
            should_reconcile_diagnosis,
            cancel.clone(),
        )));

        let detector = Arc::new(FailureDetector::new(Arc::clone(&collaborators.store)));
        handles.extend(spawn_workers(
            detector,
            &pod_queue,
            config.worker_count,
            &cancel,
        ));

        let controller = Arc::new(DiagnosisController::new(
            Arc::clone(&collaborators.store),
            Arc::clone(&collaborators.logs),
            Arc::clone(&collaborators.events),
            Arc::clone(&collaborators.reasoner),
            LifecycleSettings {
                diagnosis_timeout: config.diagnosis_timeout,
                max_attempts: config.reasoning_max_attempts,
            },
        ));
        handles.extend(spawn_workers(
            controller,
            &diagnosis_queue,
            config.worker_count,
            &cancel,
        ));

        let pod_informer = Informer::new(
            Arc::clone(&collaborators.store),
            config.watch_namespace.clone(),
            config.poll_interval,
            pod_bus,
        )
        .with_resync(config.resync_interval);
        handles.push(tokio::spawn(pod_informer.run(cancel.clone())));

        let diagnosis_informer = Informer::new(
            Arc::clone(&collaborators.store),
            config.watch_namespace.clone(),
            config.poll_interval,
            diagnosis_bus,
        )
        .with_resync(config.resync_interval);
        handles.push(tokio::spawn(diagnosis_informer.run(cancel.clone())));

        tracing::info!(
            namespace = config.watch_namespace.as_deref().unwrap_or("*"),
            workers = config.worker_count,
            "Operator started",
        );

        Self {
            cancel,
            pod_queue,
            diagnosis_queue,
            handles,
        }
    }

    /// Token cancelled by [`Operator::shutdown`]; in-flight passes observe it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait up to `grace` for them to finish.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        self.pod_queue.shutdown();
        self.diagnosis_queue.shutdown();

        let all = join_tasks(self.handles);
        if tokio::time::timeout(grace, all).await.is_err() {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Tasks still running after grace period");
        }
        tracing::info!("Operator stopped");
    }
}

async fn join_tasks(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Operator task panicked");
        }
    }
}
