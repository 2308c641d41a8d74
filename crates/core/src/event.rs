//! Cluster events attached to diagnosed pods.

use serde::{Deserialize, Serialize};

use crate::pod::{Pod, POD_API_VERSION, POD_KIND};
use crate::types::{ObjectMeta, Resource, Timestamp};

pub const EVENT_TYPE_WARNING: &str = "Warning";

/// Reason tag on every diagnosis result event.
pub const REASON_DIAGNOSIS_RESULT: &str = "AIDiagnosisResult";

/// Component name reported as the event source.
pub const REPORTING_COMPONENT: &str = "autopsy-operator";

/// Reference to the object an event is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component: String,
}

/// A core/v1 Event (subset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEvent {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub involved_object: ObjectReference,
    pub reason: String,
    pub message: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default = "one")]
    pub count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<Timestamp>,
}

fn one() -> i32 {
    1
}

impl ClusterEvent {
    /// Warning event on `pod` carrying a diagnosis result.
    pub fn diagnosis_result(pod: &Pod, root_cause: &str, suggestion: &str, at: Timestamp) -> Self {
        Self {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}.", pod.name())),
                namespace: Some(pod.namespace().to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: POD_API_VERSION.to_string(),
                kind: POD_KIND.to_string(),
                name: pod.name().to_string(),
                namespace: pod.namespace().to_string(),
                uid: pod.metadata.uid.clone(),
            },
            reason: REASON_DIAGNOSIS_RESULT.to_string(),
            message: format!("Root cause: {root_cause}\nSuggestion: {suggestion}"),
            event_type: EVENT_TYPE_WARNING.to_string(),
            source: EventSource {
                component: REPORTING_COMPONENT.to_string(),
            },
            count: 1,
            first_timestamp: Some(at),
            last_timestamp: Some(at),
        }
    }
}
