//! Resource store accessors for pods, diagnosis requests, pod logs and
//! cluster events.
//!
//! The operator depends only on the traits defined here:
//!
//! - [`ResourceStore`]: get/list/create/patch of pods and diagnoses.
//! - [`LogSource`]: tail of a pod's log stream.
//! - [`EventRecorder`]: cluster events attached to pods.
//!
//! Two implementations are provided: [`KubeClient`] talks to the
//! Kubernetes API server over HTTPS, [`MemoryStore`] keeps everything
//! in process for tests and dry runs.

pub mod error;
pub mod kube;
pub mod memory;

use async_trait::async_trait;
use autopsy_core::event::ClusterEvent;
use autopsy_core::{ObjectKey, Pod, PodDiagnosis};

pub use error::{LogError, StoreError};
pub use kube::{KubeClient, KubeConfig};
pub use memory::MemoryStore;

/// Durable object access with optimistic concurrency.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a pod; `Ok(None)` when it does not exist.
    async fn get_pod(&self, key: &ObjectKey) -> Result<Option<Pod>, StoreError>;

    /// List pods in one namespace, or in all namespaces for `None`.
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, StoreError>;

    /// Fetch a diagnosis request; `Ok(None)` when it does not exist.
    async fn get_diagnosis(&self, key: &ObjectKey) -> Result<Option<PodDiagnosis>, StoreError>;

    /// List diagnosis requests in one namespace, or in all for `None`.
    async fn list_diagnoses(&self, namespace: Option<&str>)
        -> Result<Vec<PodDiagnosis>, StoreError>;

    /// List the diagnosis requests targeting one pod.
    async fn list_diagnoses_for_pod(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<Vec<PodDiagnosis>, StoreError>;

    /// Create a diagnosis request, returning the stored object with its
    /// generated name and resource version.
    async fn create_diagnosis(&self, diagnosis: &PodDiagnosis)
        -> Result<PodDiagnosis, StoreError>;

    /// Apply a JSON merge patch to the status subresource.
    ///
    /// When the patch pins `metadata.resourceVersion` and the stored
    /// object has moved on, the write is rejected with
    /// [`StoreError::Conflict`].
    async fn patch_diagnosis_status(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<PodDiagnosis, StoreError>;
}

/// Access to container log streams.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Read the last `tail_lines` lines of a pod's log.
    async fn tail_logs(&self, key: &ObjectKey, tail_lines: i64) -> Result<String, LogError>;
}

/// Publishes cluster events.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: &ClusterEvent) -> Result<(), StoreError>;
}
