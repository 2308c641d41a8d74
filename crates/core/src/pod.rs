//! Pod resource model.
//!
//! Only the status fields the failure detector inspects are modelled;
//! unknown fields in API payloads are ignored on deserialization.

use serde::{Deserialize, Serialize};

use crate::types::{ObjectMeta, OwnerReference, Resource};

pub const POD_API_VERSION: &str = "v1";
pub const POD_KIND: &str = "Pod";

/// Terminal failure phase reported by the platform.
pub const PHASE_FAILED: &str = "Failed";
pub const PHASE_PENDING: &str = "Pending";
pub const PHASE_RUNNING: &str = "Running";
pub const PHASE_SUCCEEDED: &str = "Succeeded";

/// Condition type carrying scheduling outcome.
pub const CONDITION_POD_SCHEDULED: &str = "PodScheduled";
pub const REASON_UNSCHEDULABLE: &str = "Unschedulable";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Pod-level reason, e.g. `Evicted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PodCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// `"True"`, `"False"` or `"Unknown"`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub restart_count: i32,
}

/// At most one of the three fields is set by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ContainerStateWaiting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<ContainerStateRunning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated: Option<ContainerStateTerminated>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateWaiting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateRunning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<crate::types::Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateTerminated {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Resource for Pod {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl Pod {
    /// Create a pod with only identity set.
    ///
    /// Enriched with the `with_*` builder methods; used by fixtures and
    /// by the in-memory store.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            status: PodStatus::default(),
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.metadata.uid = Some(uid.into());
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.status.phase = Some(phase.into());
        self
    }

    pub fn with_condition(
        mut self,
        condition_type: impl Into<String>,
        status: impl Into<String>,
        reason: Option<&str>,
        message: Option<&str>,
    ) -> Self {
        self.status.conditions.push(PodCondition {
            condition_type: condition_type.into(),
            status: status.into(),
            reason: reason.map(str::to_string),
            message: message.map(str::to_string),
        });
        self
    }

    pub fn with_running_container(mut self, name: impl Into<String>) -> Self {
        self.status.container_statuses.push(ContainerStatus {
            name: name.into(),
            state: ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            },
            restart_count: 0,
        });
        self
    }

    pub fn with_waiting_container(mut self, name: impl Into<String>, reason: &str) -> Self {
        self.status.container_statuses.push(ContainerStatus {
            name: name.into(),
            state: ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: None,
                }),
                ..Default::default()
            },
            restart_count: 0,
        });
        self
    }

    pub fn with_terminated_container(
        mut self,
        name: impl Into<String>,
        exit_code: i32,
        reason: &str,
    ) -> Self {
        self.status.container_statuses.push(ContainerStatus {
            name: name.into(),
            state: ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    reason: Some(reason.to_string()),
                    message: None,
                }),
                ..Default::default()
            },
            restart_count: 0,
        });
        self
    }

    pub fn phase(&self) -> &str {
        self.status.phase.as_deref().unwrap_or_default()
    }

    /// Controller owner reference pointing at this pod.
    ///
    /// Returns `None` when the pod has no uid (never persisted), since
    /// an owner reference without a uid is rejected by the platform.
    pub fn controller_reference(&self) -> Option<OwnerReference> {
        let uid = self.metadata.uid.clone()?;
        Some(OwnerReference {
            api_version: POD_API_VERSION.to_string(),
            kind: POD_KIND.to_string(),
            name: self.name().to_string(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }
}

impl ContainerStatus {
    pub fn waiting_reason(&self) -> Option<&str> {
        self.state.waiting.as_ref()?.reason.as_deref()
    }
}
