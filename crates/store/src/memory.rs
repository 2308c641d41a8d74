//! In-process store used by tests and dry runs.
//!
//! Mirrors the API server semantics the operator relies on: generated
//! names, monotonically increasing resource versions, status merge
//! patches rejected on a stale resource version, and owner-reference
//! cascade when a pod is deleted.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use autopsy_core::event::ClusterEvent;
use autopsy_core::merge_patch;
use autopsy_core::types::Resource;
use autopsy_core::{ObjectKey, Pod, PodDiagnosis};
use chrono::Utc;

use crate::error::{LogError, StoreError};
use crate::{EventRecorder, LogSource, ResourceStore};

/// Length of the random suffix appended to `generateName`.
const GENERATED_SUFFIX_LEN: usize = 5;

#[derive(Default)]
struct Inner {
    pods: BTreeMap<ObjectKey, Pod>,
    diagnoses: BTreeMap<ObjectKey, PodDiagnosis>,
    logs: HashMap<ObjectKey, Result<String, LogError>>,
    events: Vec<ClusterEvent>,
    next_version: u64,
    status_writes: usize,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// Thread-safe in-memory implementation of the store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicked writer cannot leave the maps half-updated; every
        // mutation is a single insert or remove.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- fixture helpers ----

    /// Insert or replace a pod, assigning a uid and a new resource version.
    pub fn upsert_pod(&self, mut pod: Pod) -> Pod {
        let mut inner = self.lock();
        if pod.metadata.uid.is_none() {
            pod.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        pod.metadata.resource_version = Some(inner.bump_version());
        inner.pods.insert(pod.key(), pod.clone());
        pod
    }

    /// Delete a pod and every diagnosis it owns.
    pub fn delete_pod(&self, key: &ObjectKey) -> Option<Pod> {
        let mut inner = self.lock();
        let pod = inner.pods.remove(key)?;
        if let Some(uid) = pod.metadata.uid.as_deref() {
            inner
                .diagnoses
                .retain(|_, d| !d.metadata.owner_references.iter().any(|o| o.uid == uid));
        }
        inner.logs.remove(key);
        Some(pod)
    }

    pub fn set_logs(&self, key: &ObjectKey, logs: impl Into<String>) {
        self.lock().logs.insert(key.clone(), Ok(logs.into()));
    }

    pub fn fail_logs(&self, key: &ObjectKey, error: LogError) {
        self.lock().logs.insert(key.clone(), Err(error));
    }

    /// Replace a stored diagnosis wholesale, as an unrelated writer would.
    pub fn update_diagnosis(&self, mut diagnosis: PodDiagnosis) -> PodDiagnosis {
        let mut inner = self.lock();
        diagnosis.metadata.resource_version = Some(inner.bump_version());
        inner.diagnoses.insert(diagnosis.key(), diagnosis.clone());
        diagnosis
    }

    pub fn diagnoses(&self) -> Vec<PodDiagnosis> {
        self.lock().diagnoses.values().cloned().collect()
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.lock().events.clone()
    }

    /// Number of successful status writes since creation.
    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }
}

fn generated_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &suffix[..GENERATED_SUFFIX_LEN])
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_pod(&self, key: &ObjectKey) -> Result<Option<Pod>, StoreError> {
        Ok(self.lock().pods.get(key).cloned())
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, StoreError> {
        Ok(self
            .lock()
            .pods
            .values()
            .filter(|p| namespace.map_or(true, |ns| p.namespace() == ns))
            .cloned()
            .collect())
    }

    async fn get_diagnosis(&self, key: &ObjectKey) -> Result<Option<PodDiagnosis>, StoreError> {
        Ok(self.lock().diagnoses.get(key).cloned())
    }

    async fn list_diagnoses(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<PodDiagnosis>, StoreError> {
        Ok(self
            .lock()
            .diagnoses
            .values()
            .filter(|d| namespace.map_or(true, |ns| d.namespace() == ns))
            .cloned()
            .collect())
    }

    async fn list_diagnoses_for_pod(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<Vec<PodDiagnosis>, StoreError> {
        Ok(self
            .lock()
            .diagnoses
            .values()
            .filter(|d| d.namespace() == namespace && d.spec.pod_name == pod_name)
            .cloned()
            .collect())
    }

    async fn create_diagnosis(
        &self,
        diagnosis: &PodDiagnosis,
    ) -> Result<PodDiagnosis, StoreError> {
        let mut created = diagnosis.clone();
        if created.namespace().is_empty() {
            return Err(StoreError::Invalid(
                "diagnosis has no metadata.namespace".into(),
            ));
        }

        let mut inner = self.lock();
        if created.metadata.name.is_none() {
            let prefix = created.metadata.generate_name.clone().ok_or_else(|| {
                StoreError::Invalid("diagnosis has neither name nor generateName".into())
            })?;
            created.metadata.name = Some(generated_name(&prefix));
        }

        let key = created.key();
        if inner.diagnoses.contains_key(&key) {
            return Err(StoreError::Conflict {
                key,
                message: "already exists".into(),
            });
        }

        // Status is a subresource; it cannot be set on create.
        created.status = Default::default();
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.creation_timestamp = Some(Utc::now());
        created.metadata.resource_version = Some(inner.bump_version());
        inner.diagnoses.insert(key, created.clone());
        Ok(created)
    }

    async fn patch_diagnosis_status(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<PodDiagnosis, StoreError> {
        let mut inner = self.lock();
        let current = inner
            .diagnoses
            .get(key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "PodDiagnosis",
                key: key.clone(),
            })?;

        let pinned = patch
            .pointer("/metadata/resourceVersion")
            .and_then(|v| v.as_str());
        if let Some(expected) = pinned {
            if current.resource_version() != Some(expected) {
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    message: format!(
                        "resourceVersion {expected} is stale (current {})",
                        current.resource_version().unwrap_or_default()
                    ),
                });
            }
        }

        let mut doc = serde_json::to_value(current)?;
        if let Some(status_patch) = patch.get("status") {
            let status = doc
                .as_object_mut()
                .ok_or_else(|| StoreError::Invalid("stored object is not a JSON object".into()))?
                .entry("status")
                .or_insert_with(|| serde_json::json!({}));
            merge_patch::apply(status, status_patch);
        }

        let mut updated: PodDiagnosis = serde_json::from_value(doc)?;
        updated.metadata.resource_version = Some(inner.bump_version());
        inner.diagnoses.insert(key.clone(), updated.clone());
        inner.status_writes += 1;
        Ok(updated)
    }
}

#[async_trait]
impl LogSource for MemoryStore {
    async fn tail_logs(&self, key: &ObjectKey, tail_lines: i64) -> Result<String, LogError> {
        let inner = self.lock();
        if !inner.pods.contains_key(key) {
            return Err(LogError::Open(format!("pods \"{}\" not found", key.name)));
        }

        let logs = match inner.logs.get(key) {
            Some(Ok(logs)) => logs.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => String::new(),
        };

        let lines: Vec<&str> = logs.lines().collect();
        let keep = usize::try_from(tail_lines).unwrap_or(0).min(lines.len());
        let mut tail = lines[lines.len() - keep..].join("\n");
        if keep > 0 {
            tail.push('\n');
        }
        Ok(tail)
    }
}

#[async_trait]
impl EventRecorder for MemoryStore {
    async fn record(&self, event: &ClusterEvent) -> Result<(), StoreError> {
        self.lock().events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use autopsy_core::pod::PHASE_FAILED;
    use serde_json::json;

    use super::*;

    fn failed_pod() -> Pod {
        Pod::new("shop", "cart-7f9")
            .with_phase(PHASE_FAILED)
            .with_terminated_container("cart", 1, "Error")
    }

    #[tokio::test]
    async fn create_generates_name_and_version() {
        let store = MemoryStore::new();
        let pod = store.upsert_pod(failed_pod());

        let created = store
            .create_diagnosis(&PodDiagnosis::for_pod(&pod))
            .await
            .unwrap();

        let name = created.name();
        assert!(name.starts_with("cart-7f9-diagnosis-"));
        assert_eq!(name.len(), "cart-7f9-diagnosis-".len() + GENERATED_SUFFIX_LEN);
        assert!(created.resource_version().is_some());
        assert_eq!(store.diagnoses().len(), 1);
    }

    #[tokio::test]
    async fn stale_resource_version_is_rejected() {
        let store = MemoryStore::new();
        let pod = store.upsert_pod(failed_pod());
        let created = store
            .create_diagnosis(&PodDiagnosis::for_pod(&pod))
            .await
            .unwrap();
        let stale = created.resource_version().unwrap().to_string();

        // An unrelated writer touches the object.
        let mut edited = created.clone();
        edited.metadata.labels.insert("team".into(), "sre".into());
        store.update_diagnosis(edited);

        let patch = json!({"metadata": {"resourceVersion": stale}, "status": {"phase": "Completed"}});
        let result = store.patch_diagnosis_status(&created.key(), &patch).await;
        assert_matches!(result, Err(StoreError::Conflict { .. }));
        assert_eq!(store.status_writes(), 0);
    }

    #[tokio::test]
    async fn status_patch_merges_without_touching_other_fields() {
        let store = MemoryStore::new();
        let pod = store.upsert_pod(failed_pod());
        let created = store
            .create_diagnosis(&PodDiagnosis::for_pod(&pod))
            .await
            .unwrap();

        let patch = json!({"status": {"phase": "Failed", "rootCause": "boom"}});
        let updated = store
            .patch_diagnosis_status(&created.key(), &patch)
            .await
            .unwrap();

        assert_eq!(updated.status.phase, "Failed");
        assert_eq!(updated.status.root_cause, "boom");
        assert_eq!(updated.spec, created.spec);
        assert_eq!(updated.metadata.labels, created.metadata.labels);
        assert_ne!(updated.resource_version(), created.resource_version());
    }

    #[tokio::test]
    async fn deleting_pod_cascades_to_owned_diagnoses() {
        let store = MemoryStore::new();
        let pod = store.upsert_pod(failed_pod());
        let other = store.upsert_pod(Pod::new("shop", "web-1").with_phase(PHASE_FAILED));
        store
            .create_diagnosis(&PodDiagnosis::for_pod(&pod))
            .await
            .unwrap();
        store
            .create_diagnosis(&PodDiagnosis::for_pod(&other))
            .await
            .unwrap();

        store.delete_pod(&pod.key());

        let remaining = store.diagnoses();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].spec.pod_name, "web-1");
    }

    #[tokio::test]
    async fn tail_logs_returns_last_lines() {
        let store = MemoryStore::new();
        let pod = store.upsert_pod(failed_pod());
        store.set_logs(&pod.key(), "one\ntwo\nthree\n");

        assert_eq!(store.tail_logs(&pod.key(), 2).await.unwrap(), "two\nthree\n");
        assert_eq!(
            store.tail_logs(&pod.key(), 100).await.unwrap(),
            "one\ntwo\nthree\n"
        );
    }

    #[tokio::test]
    async fn tail_logs_of_missing_pod_fails_to_open() {
        let store = MemoryStore::new();
        let result = store.tail_logs(&ObjectKey::new("shop", "ghost"), 10).await;
        assert_matches!(result, Err(LogError::Open(_)));
    }

    #[tokio::test]
    async fn list_for_pod_filters_by_spec() {
        let store = MemoryStore::new();
        let pod = store.upsert_pod(failed_pod());
        store
            .create_diagnosis(&PodDiagnosis::for_pod(&pod))
            .await
            .unwrap();

        assert_eq!(
            store
                .list_diagnoses_for_pod("shop", "cart-7f9")
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .list_diagnoses_for_pod("other", "cart-7f9")
            .await
            .unwrap()
            .is_empty());
    }
}
