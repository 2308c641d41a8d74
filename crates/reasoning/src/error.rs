use std::time::Duration;

/// Errors from a single reasoning call.
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    /// Endpoint URL or credential missing, or an invalid setting.
    #[error("reasoning service not configured: {0}")]
    Config(String),

    /// The HTTP request itself failed (network, DNS, TLS, client timeout).
    #[error("reasoning request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("reasoning service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The envelope or the inner result could not be parsed.
    #[error("malformed reasoning response ({reason}); raw content: {content}")]
    Parse { reason: String, content: String },

    /// The call exceeded the diagnosis deadline.
    #[error("reasoning call timed out after {0:?}")]
    Timeout(Duration),
}

impl ReasoningError {
    /// Whether a later attempt could plausibly succeed.
    ///
    /// Network failures, timeouts, HTTP 429 and 5xx are transient;
    /// configuration, other 4xx and parse failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ReasoningError::Request(e) => !e.is_builder(),
            ReasoningError::Api { status, .. } => *status == 429 || *status >= 500,
            ReasoningError::Timeout(_) => true,
            ReasoningError::Config(_) | ReasoningError::Parse { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let api = |status| ReasoningError::Api {
            status,
            body: String::new(),
        };
        assert!(api(429).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(401).is_transient());
        assert!(ReasoningError::Timeout(Duration::from_secs(45)).is_transient());
        assert!(!ReasoningError::Config("AI_API_URL is not set".into()).is_transient());
        assert!(!ReasoningError::Parse {
            reason: "no choices".into(),
            content: "{}".into()
        }
        .is_transient());
    }

    #[test]
    fn timeout_message_names_deadline() {
        let err = ReasoningError::Timeout(Duration::from_secs(45));
        assert_eq!(err.to_string(), "reasoning call timed out after 45s");
    }
}
