use autopsy_core::ObjectKey;

/// Errors from the resource store.
///
/// None of these are converted into diagnosis status; they are surfaced
/// to the work queue, which re-delivers the object after a backoff.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API server returned an unexpected non-2xx status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    /// Optimistic-concurrency rejection; the caller must re-read.
    #[error("Conflict writing {key}: {message}")]
    Conflict { key: ObjectKey, message: String },

    #[error("Invalid object: {0}")]
    Invalid(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors from reading a pod's log stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    #[error("failed to open log stream: {0}")]
    Open(String),

    #[error("failed to read log stream: {0}")]
    Read(String),
}
