//! Diagnosis lifecycle controller.
//!
//! Drives one pending `PodDiagnosis` to a terminal phase in a single
//! pass: fetch the pod's log tail, ask the reasoning service, emit a
//! Warning event on the pod and commit the result. Every status write
//! is a merge patch against the snapshot read at the start of the pass,
//! pinned to its resource version.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autopsy_core::event::ClusterEvent;
use autopsy_core::merge_patch;
use autopsy_core::types::Resource;
use autopsy_core::{ObjectKey, PodDiagnosis};
use autopsy_reasoning::{Diagnosis, Reasoner, ReasoningError};
use autopsy_store::{EventRecorder, LogSource, ResourceStore};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::ControllerError;
use crate::runtime::Reconciler;

/// Default wall-clock bound on one reasoning call.
pub const DEFAULT_DIAGNOSIS_TIMEOUT: Duration = Duration::from_secs(45);

/// Result of one lifecycle pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The diagnosis no longer exists.
    Gone,
    /// The diagnosis was already Completed or Failed; nothing was done.
    AlreadyTerminal,
    Completed { event_recorded: bool },
    Failed { root_cause: String },
    /// A transient reasoning failure was absorbed by the retry budget.
    Retrying { attempts: u32 },
}

impl PassOutcome {
    pub fn wants_retry(&self) -> bool {
        matches!(self, PassOutcome::Retrying { .. })
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub diagnosis_timeout: Duration,
    /// Reasoning attempts per diagnosis; 1 means a single attempt.
    pub max_attempts: u32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            diagnosis_timeout: DEFAULT_DIAGNOSIS_TIMEOUT,
            max_attempts: 1,
        }
    }
}

pub struct DiagnosisController {
    store: Arc<dyn ResourceStore>,
    logs: Arc<dyn LogSource>,
    events: Arc<dyn EventRecorder>,
    reasoner: Arc<dyn Reasoner>,
    settings: LifecycleSettings,
}

impl DiagnosisController {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        logs: Arc<dyn LogSource>,
        events: Arc<dyn EventRecorder>,
        reasoner: Arc<dyn Reasoner>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            logs,
            events,
            reasoner,
            settings,
        }
    }

    /// Run one pass for the diagnosis at `key`.
    ///
    /// Log and reasoning failures end in a Failed status and an `Ok`
    /// outcome. Store failures and cancellation return `Err` without
    /// writing anything.
    pub async fn reconcile_diagnosis(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, ControllerError> {
        let Some(snapshot) = self.store.get_diagnosis(key).await? else {
            return Ok(PassOutcome::Gone);
        };

        if snapshot.is_terminal() {
            tracing::debug!(diagnosis = %key, phase = %snapshot.phase(), "Already terminal, skipping");
            return Ok(PassOutcome::AlreadyTerminal);
        }

        let pod_key = target_pod(&snapshot);
        let tail_lines = snapshot.effective_tail_lines();
        tracing::info!(diagnosis = %key, pod = %pod_key, tail_lines, "Fetching pod logs");

        // -- Step 1: logs --
        let logs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ControllerError::Cancelled),
            result = self.logs.tail_logs(&pod_key, tail_lines) => result,
        };
        let logs = match logs {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(diagnosis = %key, pod = %pod_key, error = %e, "Log fetch failed");
                return self
                    .commit_failed(&snapshot, format!("failed to fetch logs: {e}"))
                    .await;
            }
        };

        // -- Step 2: reasoning --
        tracing::info!(diagnosis = %key, log_bytes = logs.len(), "Requesting diagnosis");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ControllerError::Cancelled),
            result = self.diagnose(&snapshot, &logs) => result,
        };
        let diagnosis = match result {
            Ok(diagnosis) => diagnosis,
            Err(e)
                if e.is_transient()
                    && within_budget(snapshot.status.attempts, self.settings.max_attempts) =>
            {
                tracing::warn!(diagnosis = %key, error = %e, "Transient reasoning failure, will retry");
                return self.commit_retry(&snapshot).await;
            }
            Err(e) => {
                tracing::error!(diagnosis = %key, error = %e, "Reasoning failed");
                return self
                    .commit_failed(&snapshot, format!("diagnosis failed: {e}"))
                    .await;
            }
        };

        // -- Step 3: event on the pod --
        let now = Utc::now();
        let event_recorded = self.emit_event(&pod_key, &diagnosis, now).await;

        // -- Step 4: commit --
        let mut completed = snapshot.clone();
        completed.complete(&diagnosis.root_cause, &diagnosis.suggestion, now)?;
        self.commit(&snapshot, &completed).await?;

        tracing::info!(
            diagnosis = %key,
            root_cause = %diagnosis.root_cause,
            event_recorded,
            "Diagnosis completed",
        );
        Ok(PassOutcome::Completed { event_recorded })
    }

    async fn diagnose(
        &self,
        snapshot: &PodDiagnosis,
        logs: &str,
    ) -> Result<Diagnosis, ReasoningError> {
        let timeout = self.settings.diagnosis_timeout;
        let call = self.reasoner.diagnose(
            &snapshot.spec.pod_name,
            &snapshot.spec.trigger_reason,
            logs,
        );
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ReasoningError::Timeout(timeout)),
        }
    }

    /// Record the result on the pod. A missing pod or a failed write only
    /// skips the event.
    async fn emit_event(
        &self,
        pod_key: &ObjectKey,
        diagnosis: &Diagnosis,
        at: chrono::DateTime<Utc>,
    ) -> bool {
        let pod = match self.store.get_pod(pod_key).await {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                tracing::info!(pod = %pod_key, "Target pod no longer exists, skipping event");
                return false;
            }
            Err(e) => {
                tracing::warn!(pod = %pod_key, error = %e, "Could not read target pod, skipping event");
                return false;
            }
        };

        let event =
            ClusterEvent::diagnosis_result(&pod, &diagnosis.root_cause, &diagnosis.suggestion, at);
        match self.events.record(&event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(pod = %pod_key, error = %e, "Failed to record diagnosis event");
                false
            }
        }
    }

    async fn commit_failed(
        &self,
        snapshot: &PodDiagnosis,
        root_cause: String,
    ) -> Result<PassOutcome, ControllerError> {
        let mut failed = snapshot.clone();
        failed.fail(root_cause.clone(), Utc::now())?;
        self.commit(snapshot, &failed).await?;

        tracing::info!(diagnosis = %snapshot.key(), root_cause = %root_cause, "Diagnosis failed");
        Ok(PassOutcome::Failed { root_cause })
    }

    async fn commit_retry(&self, snapshot: &PodDiagnosis) -> Result<PassOutcome, ControllerError> {
        let mut retrying = snapshot.clone();
        let attempts = retrying.record_attempt()?;
        self.commit(snapshot, &retrying).await?;
        Ok(PassOutcome::Retrying { attempts })
    }

    async fn commit(
        &self,
        snapshot: &PodDiagnosis,
        mutated: &PodDiagnosis,
    ) -> Result<PodDiagnosis, ControllerError> {
        let patch = merge_patch::status_patch(snapshot, mutated, snapshot.resource_version())?;
        Ok(self
            .store
            .patch_diagnosis_status(&snapshot.key(), &patch)
            .await?)
    }
}

/// Whether one more absorbed failure still leaves an attempt.
fn within_budget(attempts: u32, max_attempts: u32) -> bool {
    attempts.saturating_add(1) < max_attempts
}

/// The pod a diagnosis targets; the spec namespace falls back to the
/// diagnosis' own namespace when empty.
fn target_pod(diagnosis: &PodDiagnosis) -> ObjectKey {
    let namespace = if diagnosis.spec.namespace.is_empty() {
        diagnosis.namespace()
    } else {
        diagnosis.spec.namespace.as_str()
    };
    ObjectKey::new(namespace, diagnosis.spec.pod_name.as_str())
}

#[async_trait]
impl Reconciler for DiagnosisController {
    type Outcome = PassOutcome;

    fn name(&self) -> &'static str {
        "diagnosis-lifecycle"
    }

    async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, ControllerError> {
        self.reconcile_diagnosis(key, cancel).await
    }

    fn wants_retry(&self, outcome: &PassOutcome) -> bool {
        outcome.wants_retry()
    }
}

#[cfg(test)]
mod tests {
    use autopsy_core::Pod;

    use super::*;

    #[test]
    fn target_pod_prefers_spec_namespace() {
        let mut d = PodDiagnosis::for_pod(&Pod::new("shop", "cart"));
        assert_eq!(target_pod(&d), ObjectKey::new("shop", "cart"));

        d.spec.namespace = String::new();
        d.metadata.namespace = Some("fallback".into());
        assert_eq!(target_pod(&d), ObjectKey::new("fallback", "cart"));
    }

    #[test]
    fn budget_check_tolerates_edited_attempts() {
        assert!(within_budget(0, 2));
        assert!(!within_budget(1, 2));
        assert!(!within_budget(0, 1));
        assert!(!within_budget(u32::MAX, u32::MAX));
    }

    #[test]
    fn only_retrying_outcome_wants_retry() {
        assert!(PassOutcome::Retrying { attempts: 1 }.wants_retry());
        assert!(!PassOutcome::AlreadyTerminal.wants_retry());
        assert!(!PassOutcome::Failed {
            root_cause: "x".into()
        }
        .wants_retry());
    }
}
