//! Prompt construction.

use serde::Serialize;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";

/// Persona and output contract sent with every request.
pub const SYSTEM_PROMPT: &str = "\
You are a senior cloud-native architect and Kubernetes SRE.
Given the failure information and logs of a pod, determine the root cause \
of the failure and give an actionable fix.
Respond with a strict JSON object containing exactly two fields:
1. \"rootCause\": one or two sentences summarising the root cause.
2. \"suggestion\": concrete troubleshooting or remediation steps \
(for example raising a memory limit or checking a ConfigMap).
Do not emit Markdown or any text outside the JSON object.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

/// Build the two-message prompt for one failing pod.
pub fn build(pod_name: &str, trigger_reason: &str, logs: &str) -> Vec<Message> {
    let user = format!(
        "Pod name: {pod_name}\n\
         Trigger reason: {trigger_reason}\n\
         Log tail (stdout/stderr):\n\
         ---\n\
         {logs}\n\
         ---"
    );

    vec![
        Message {
            role: ROLE_SYSTEM,
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: ROLE_USER,
            content: user,
        },
    ]
}
