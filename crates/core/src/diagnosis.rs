//! The `PodDiagnosis` custom resource and its phase state machine.
//!
//! A diagnosis is created once by the failure detector, moves exactly
//! once from pending to a terminal phase, and is garbage-collected with
//! the pod that owns it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::failure;
use crate::pod::Pod;
use crate::types::{ObjectMeta, Resource, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const GROUP: &str = "diagnostic.sre.example.com";
pub const VERSION: &str = "v1";
pub const API_VERSION: &str = "diagnostic.sre.example.com/v1";
pub const KIND: &str = "PodDiagnosis";
pub const PLURAL: &str = "poddiagnoses";

/// Stored phase strings. Pending is the empty string.
pub const PHASE_COMPLETED: &str = "Completed";
pub const PHASE_FAILED: &str = "Failed";

/// Tail lines fetched when the spec leaves `tailLines` at zero.
pub const DEFAULT_TAIL_LINES: i32 = 100;

/// Label carrying the diagnosed pod name. Informational only: lookups
/// match on `spec.podName`.
pub const LABEL_DIAGNOSED_POD: &str = "diagnosed-pod";
/// Longest value the API server accepts for a label.
pub const LABEL_VALUE_MAX_LEN: usize = 63;
pub const LABEL_CREATED_BY: &str = "created-by";
pub const CREATED_BY_POD_WATCHER: &str = "pod-watcher";

// ---------------------------------------------------------------------------
// DiagnosisPhase
// ---------------------------------------------------------------------------

/// Lifecycle phase of a diagnosis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisPhase {
    Pending,
    Completed,
    Failed,
}

impl DiagnosisPhase {
    /// String representation as stored in `status.phase`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisPhase::Pending => "",
            DiagnosisPhase::Completed => PHASE_COMPLETED,
            DiagnosisPhase::Failed => PHASE_FAILED,
        }
    }

    /// Parse from the stored string, treating unknown values as pending.
    pub fn from_str(s: &str) -> Self {
        match s {
            PHASE_COMPLETED => DiagnosisPhase::Completed,
            PHASE_FAILED => DiagnosisPhase::Failed,
            _ => DiagnosisPhase::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DiagnosisPhase::Pending)
    }
}

impl fmt::Display for DiagnosisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosisPhase::Pending => f.write_str("Pending"),
            other => f.write_str(other.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDiagnosis {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: PodDiagnosisSpec,
    #[serde(default)]
    pub status: PodDiagnosisStatus,
}

/// Immutable after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDiagnosisSpec {
    pub pod_name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trigger_reason: String,
    /// Zero means [`DEFAULT_TAIL_LINES`].
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tail_lines: i32,
}

/// Written only by the lifecycle controller, one whole transition at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodDiagnosisStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_cause: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_time: Option<Timestamp>,
    /// Transient reasoning failures already absorbed by the retry budget.
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub attempts: u32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn is_zero_u32(n: &u32) -> bool {
    *n == 0
}

impl Resource for PodDiagnosis {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl PodDiagnosis {
    /// Build a new diagnosis request for a failed pod.
    ///
    /// The name is generated by the store from `<pod>-diagnosis-`. The
    /// request is owned by the pod when the pod carries a uid.
    pub fn for_pod(pod: &Pod) -> Self {
        let pod_name = pod.name().to_string();
        let namespace = pod.namespace().to_string();

        let mut labels = BTreeMap::new();
        if pod_name.len() <= LABEL_VALUE_MAX_LEN {
            labels.insert(LABEL_DIAGNOSED_POD.to_string(), pod_name.clone());
        }
        labels.insert(
            LABEL_CREATED_BY.to_string(),
            CREATED_BY_POD_WATCHER.to_string(),
        );

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ObjectMeta {
                generate_name: Some(format!("{pod_name}-diagnosis-")),
                namespace: Some(namespace.clone()),
                labels,
                owner_references: pod.controller_reference().into_iter().collect(),
                ..Default::default()
            },
            spec: PodDiagnosisSpec {
                pod_name,
                namespace,
                trigger_reason: failure::trigger_reason(pod),
                tail_lines: DEFAULT_TAIL_LINES,
            },
            status: PodDiagnosisStatus::default(),
        }
    }

    pub fn phase(&self) -> DiagnosisPhase {
        DiagnosisPhase::from_str(&self.status.phase)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Effective number of log lines to fetch.
    pub fn effective_tail_lines(&self) -> i64 {
        if self.spec.tail_lines <= 0 {
            i64::from(DEFAULT_TAIL_LINES)
        } else {
            i64::from(self.spec.tail_lines)
        }
    }

    /// Move to `Completed`, recording the full result in one step.
    pub fn complete(
        &mut self,
        root_cause: impl Into<String>,
        suggestion: impl Into<String>,
        at: Timestamp,
    ) -> Result<(), CoreError> {
        self.transition(DiagnosisPhase::Completed)?;
        self.status.root_cause = root_cause.into();
        self.status.suggestion = suggestion.into();
        self.status.diagnosis_time = Some(at);
        Ok(())
    }

    /// Move to `Failed` with a description of what went wrong.
    pub fn fail(&mut self, root_cause: impl Into<String>, at: Timestamp) -> Result<(), CoreError> {
        self.transition(DiagnosisPhase::Failed)?;
        self.status.root_cause = root_cause.into();
        self.status.suggestion = String::new();
        self.status.diagnosis_time = Some(at);
        Ok(())
    }

    /// Record one more absorbed transient failure; phase stays pending.
    pub fn record_attempt(&mut self) -> Result<u32, CoreError> {
        let from = self.phase();
        if from.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from,
                to: DiagnosisPhase::Pending,
            });
        }
        self.status.attempts = self.status.attempts.saturating_add(1);
        Ok(self.status.attempts)
    }

    fn transition(&mut self, to: DiagnosisPhase) -> Result<(), CoreError> {
        let from = self.phase();
        if from.is_terminal() {
            return Err(CoreError::InvalidTransition { from, to });
        }
        self.status.phase = to.as_str().to_string();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
