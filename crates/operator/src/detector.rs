//! Failure detector.
//!
//! Pod watch events pass through [`should_trigger`] before their key is
//! queued; [`FailureDetector::reconcile_pod`] then re-reads the pod, confirms
//! it is still failed and creates a diagnosis request unless one is
//! already in progress.
//!
//! [`should_trigger`]: autopsy_core::watch::should_trigger

use std::sync::Arc;

use async_trait::async_trait;
use autopsy_core::failure::is_failed;
use autopsy_core::types::Resource;
use autopsy_core::{ObjectKey, PodDiagnosis};
use autopsy_store::ResourceStore;
use tokio_util::sync::CancellationToken;

use crate::error::ControllerError;
use crate::runtime::Reconciler;

/// Result of one detector pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectOutcome {
    /// The pod no longer exists.
    PodGone,
    /// The pod recovered before it was processed.
    Healthy,
    /// A non-terminal diagnosis already exists for the pod.
    AlreadyDiagnosing { existing: String },
    /// A new diagnosis request was created.
    Created { diagnosis: String },
}

pub struct FailureDetector {
    store: Arc<dyn ResourceStore>,
}

impl FailureDetector {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Process one pod.
    ///
    /// Store errors are returned unchanged and nothing is written, so a
    /// re-delivery starts from scratch.
    pub async fn reconcile_pod(&self, key: &ObjectKey) -> Result<DetectOutcome, ControllerError> {
        let Some(pod) = self.store.get_pod(key).await? else {
            return Ok(DetectOutcome::PodGone);
        };

        if !is_failed(&pod) {
            return Ok(DetectOutcome::Healthy);
        }

        let existing = self
            .store
            .list_diagnoses_for_pod(pod.namespace(), pod.name())
            .await?;
        if let Some(active) = existing.iter().find(|d| !d.is_terminal()) {
            tracing::info!(
                pod = %key,
                diagnosis = %active.name(),
                "Diagnosis already in progress, skipping",
            );
            return Ok(DetectOutcome::AlreadyDiagnosing {
                existing: active.name().to_string(),
            });
        }

        let request = PodDiagnosis::for_pod(&pod);
        let created = self.store.create_diagnosis(&request).await?;

        tracing::info!(
            pod = %key,
            diagnosis = %created.name(),
            trigger_reason = %created.spec.trigger_reason,
            "Created diagnosis request for failed pod",
        );
        Ok(DetectOutcome::Created {
            diagnosis: created.name().to_string(),
        })
    }
}

#[async_trait]
impl Reconciler for FailureDetector {
    type Outcome = DetectOutcome;

    fn name(&self) -> &'static str {
        "failure-detector"
    }

    async fn reconcile(
        &self,
        key: &ObjectKey,
        _cancel: &CancellationToken,
    ) -> Result<DetectOutcome, ControllerError> {
        self.reconcile_pod(key).await
    }
}
