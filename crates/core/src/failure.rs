//! Pod failure classification.
//!
//! [`is_failed`] decides whether a pod needs diagnosis; [`failure_signal`]
//! extracts the most specific explanation available for the trigger
//! reason recorded on the diagnosis request. Both are pure functions over
//! the pod's observed status.

use std::fmt;

use crate::pod::{
    ContainerStatus, Pod, PodCondition, CONDITION_POD_SCHEDULED, PHASE_FAILED, PHASE_PENDING,
    REASON_UNSCHEDULABLE,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Waiting reasons that mark a pending pod as failed.
pub const PENDING_FAILURE_REASONS: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "CrashLoopBackOff",
    "CreateContainerError",
];

/// Waiting reasons that mark a pod as failed in any phase.
pub const CRASH_REASONS: &[&str] = &["CrashLoopBackOff", "CreateContainerError"];

/// Prefix of every trigger reason written by the detector.
pub const TRIGGER_REASON_PREFIX: &str = "Pod entered failed state";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Whether the pod is in a state that warrants a diagnosis.
///
/// True iff any of:
/// 1. the phase is `Failed`;
/// 2. the phase is `Pending` and scheduling failed as unschedulable, or a
///    container waits with a reason in [`PENDING_FAILURE_REASONS`];
/// 3. every container terminated and at least one exit code is non-zero,
///    or some non-terminated container waits with a reason in
///    [`CRASH_REASONS`].
pub fn is_failed(pod: &Pod) -> bool {
    let phase = pod.phase();
    if phase == PHASE_FAILED {
        return true;
    }

    if phase == PHASE_PENDING {
        if pod.status.conditions.iter().any(is_unschedulable) {
            return true;
        }
        if pod
            .status
            .container_statuses
            .iter()
            .any(|c| waits_with(c, PENDING_FAILURE_REASONS))
        {
            return true;
        }
    }

    let mut all_terminated = true;
    let mut has_non_zero = false;
    for status in &pod.status.container_statuses {
        match &status.state.terminated {
            Some(terminated) => {
                if terminated.exit_code != 0 {
                    has_non_zero = true;
                }
            }
            None => {
                all_terminated = false;
                if waits_with(status, CRASH_REASONS) {
                    return true;
                }
            }
        }
    }

    all_terminated && has_non_zero
}

fn is_unschedulable(cond: &PodCondition) -> bool {
    cond.condition_type == CONDITION_POD_SCHEDULED
        && cond.status == "False"
        && cond.reason.as_deref() == Some(REASON_UNSCHEDULABLE)
}

fn waits_with(status: &ContainerStatus, reasons: &[&str]) -> bool {
    status
        .waiting_reason()
        .is_some_and(|reason| reasons.contains(&reason))
}

// ---------------------------------------------------------------------------
// FailureSignal
// ---------------------------------------------------------------------------

/// The most specific failure explanation found on a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignal {
    /// The scheduler could not place the pod.
    Unschedulable { message: String },

    /// A container terminated with a non-zero exit code.
    ContainerExited {
        container: String,
        exit_code: i32,
        reason: String,
    },

    /// A container is stuck waiting with a failure reason.
    ContainerWaiting {
        container: String,
        reason: String,
        message: Option<String>,
    },

    /// The pod itself reports a reason (e.g. eviction).
    PodReason { reason: String, message: String },

    /// No specific signal found.
    Unknown,
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureSignal::Unschedulable { message } => write!(f, "Unschedulable: {message}"),
            FailureSignal::ContainerExited {
                container,
                exit_code,
                reason,
            } => write!(f, "container {container} exited with code {exit_code}: {reason}"),
            FailureSignal::ContainerWaiting {
                container,
                reason,
                message: Some(message),
            } => write!(f, "container {container} is waiting: {reason}: {message}"),
            FailureSignal::ContainerWaiting {
                container, reason, ..
            } => write!(f, "container {container} is waiting: {reason}"),
            FailureSignal::PodReason { reason, message } => write!(f, "{reason}: {message}"),
            FailureSignal::Unknown => f.write_str("unknown failure"),
        }
    }
}

/// Extract the most specific failure signal from a pod.
///
/// Preference order: scheduling failure, non-zero container exit,
/// container waiting with a failure reason, pod-level reason, unknown.
pub fn failure_signal(pod: &Pod) -> FailureSignal {
    if let Some(cond) = pod.status.conditions.iter().find(|c| is_unschedulable(c)) {
        return FailureSignal::Unschedulable {
            message: cond.message.clone().unwrap_or_default(),
        };
    }

    for status in &pod.status.container_statuses {
        if let Some(terminated) = &status.state.terminated {
            if terminated.exit_code != 0 {
                return FailureSignal::ContainerExited {
                    container: status.name.clone(),
                    exit_code: terminated.exit_code,
                    reason: terminated.reason.clone().unwrap_or_default(),
                };
            }
        }
    }

    for status in &pod.status.container_statuses {
        if waits_with(status, PENDING_FAILURE_REASONS) {
            let waiting = status.state.waiting.as_ref();
            return FailureSignal::ContainerWaiting {
                container: status.name.clone(),
                reason: status.waiting_reason().unwrap_or_default().to_string(),
                message: waiting.and_then(|w| w.message.clone()),
            };
        }
    }

    if let Some(reason) = &pod.status.reason {
        return FailureSignal::PodReason {
            reason: reason.clone(),
            message: pod.status.message.clone().unwrap_or_default(),
        };
    }

    FailureSignal::Unknown
}

/// Human-readable trigger reason recorded on a new diagnosis request.
pub fn trigger_reason(pod: &Pod) -> String {
    format!("{TRIGGER_REASON_PREFIX}: {}", failure_signal(pod))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{PHASE_RUNNING, PHASE_SUCCEEDED};

    fn pod() -> Pod {
        Pod::new("default", "web-0")
    }

    // -- is_failed: condition 1 --

    #[test]
    fn failed_phase_is_failed() {
        assert!(is_failed(&pod().with_phase(PHASE_FAILED)));
    }

    // -- is_failed: condition 2 --

    #[test]
    fn pending_unschedulable_is_failed() {
        let p = pod().with_phase(PHASE_PENDING).with_condition(
            CONDITION_POD_SCHEDULED,
            "False",
            Some(REASON_UNSCHEDULABLE),
            Some("0/3 nodes are available: 3 Insufficient cpu."),
        );
        assert!(is_failed(&p));
    }

    #[test]
    fn pending_scheduled_condition_true_is_not_failed() {
        let p = pod()
            .with_phase(PHASE_PENDING)
            .with_condition(CONDITION_POD_SCHEDULED, "True", None, None);
        assert!(!is_failed(&p));
    }

    #[test]
    fn pending_with_each_image_or_crash_reason_is_failed() {
        for reason in PENDING_FAILURE_REASONS {
            let p = pod()
                .with_phase(PHASE_PENDING)
                .with_waiting_container("app", reason);
            assert!(is_failed(&p), "{reason} should be failed");
        }
    }

    #[test]
    fn image_pull_backoff_outside_pending_is_not_failed() {
        let p = pod()
            .with_phase(PHASE_RUNNING)
            .with_waiting_container("app", "ImagePullBackOff");
        assert!(!is_failed(&p));
    }

    #[test]
    fn pending_container_creating_is_not_failed() {
        let p = pod()
            .with_phase(PHASE_PENDING)
            .with_waiting_container("app", "ContainerCreating");
        assert!(!is_failed(&p));
    }

    // -- is_failed: condition 3 --

    #[test]
    fn all_terminated_with_non_zero_exit_is_failed() {
        let p = pod()
            .with_phase(PHASE_RUNNING)
            .with_terminated_container("app", 0, "Completed")
            .with_terminated_container("sidecar", 137, "OOMKilled");
        assert!(is_failed(&p));
    }

    #[test]
    fn all_terminated_with_zero_exits_is_not_failed() {
        let p = pod()
            .with_phase(PHASE_SUCCEEDED)
            .with_terminated_container("app", 0, "Completed")
            .with_terminated_container("sidecar", 0, "Completed");
        assert!(!is_failed(&p));
    }

    #[test]
    fn partially_terminated_non_zero_is_not_failed() {
        let p = pod()
            .with_phase(PHASE_RUNNING)
            .with_running_container("app")
            .with_terminated_container("sidecar", 1, "Error");
        assert!(!is_failed(&p));
    }

    #[test]
    fn running_pod_with_crash_loop_container_is_failed() {
        let p = pod()
            .with_phase(PHASE_RUNNING)
            .with_running_container("sidecar")
            .with_waiting_container("app", "CrashLoopBackOff");
        assert!(is_failed(&p));
    }

    #[test]
    fn running_pod_with_create_container_error_is_failed() {
        let p = pod()
            .with_phase(PHASE_RUNNING)
            .with_waiting_container("app", "CreateContainerError");
        assert!(is_failed(&p));
    }

    #[test]
    fn healthy_running_pod_is_not_failed() {
        let p = pod().with_phase(PHASE_RUNNING).with_running_container("app");
        assert!(!is_failed(&p));
    }

    #[test]
    fn pod_without_containers_is_not_failed() {
        assert!(!is_failed(&pod().with_phase(PHASE_RUNNING)));
        assert!(!is_failed(&pod()));
    }

    // -- failure_signal --

    #[test]
    fn signal_prefers_scheduling_failure() {
        let p = pod()
            .with_phase(PHASE_PENDING)
            .with_condition(
                CONDITION_POD_SCHEDULED,
                "False",
                Some(REASON_UNSCHEDULABLE),
                Some("no nodes"),
            )
            .with_waiting_container("app", "ErrImagePull");
        assert_eq!(failure_signal(&p).to_string(), "Unschedulable: no nodes");
    }

    #[test]
    fn signal_reports_exit_code() {
        let p = pod()
            .with_phase(PHASE_FAILED)
            .with_terminated_container("app", 137, "OOMKilled");
        assert_eq!(
            failure_signal(&p).to_string(),
            "container app exited with code 137: OOMKilled"
        );
    }

    #[test]
    fn signal_reports_waiting_reason_with_message() {
        let mut p = pod()
            .with_phase(PHASE_RUNNING)
            .with_waiting_container("app", "CrashLoopBackOff");
        p.status.container_statuses[0]
            .state
            .waiting
            .as_mut()
            .unwrap()
            .message = Some("back-off 40s restarting failed container".into());

        assert_eq!(
            trigger_reason(&p),
            "Pod entered failed state: container app is waiting: CrashLoopBackOff: \
             back-off 40s restarting failed container"
        );
    }

    #[test]
    fn signal_falls_back_to_pod_reason() {
        let mut p = pod().with_phase(PHASE_FAILED);
        p.status.reason = Some("Evicted".into());
        p.status.message = Some("The node was low on resource: memory.".into());
        assert_eq!(
            failure_signal(&p).to_string(),
            "Evicted: The node was low on resource: memory."
        );
    }

    #[test]
    fn signal_unknown_when_nothing_specific() {
        let p = pod().with_phase(PHASE_FAILED);
        assert_eq!(failure_signal(&p), FailureSignal::Unknown);
        assert_eq!(trigger_reason(&p), "Pod entered failed state: unknown failure");
    }
}
