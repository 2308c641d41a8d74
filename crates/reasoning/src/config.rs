use std::time::Duration;

use crate::error::ReasoningError;

/// Default HTTP timeout for a single completion request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Reasoning endpoint settings, resolved once at startup.
///
/// URL and key are optional here so that an unconfigured operator can
/// still start; every diagnosis then fails with
/// [`ReasoningError::Config`] without a network attempt.
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Passed through verbatim, empty when unset.
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ReasoningConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default   |
    /// |---------------------------|-----------|
    /// | `AI_API_URL`              | (none)    |
    /// | `AI_API_KEY`              | (none)    |
    /// | `AI_MODEL`                | `""`      |
    /// | `AI_REQUEST_TIMEOUT_SECS` | `30`      |
    pub fn from_env() -> Result<Self, ReasoningError> {
        let request_timeout_secs = match non_empty_var("AI_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ReasoningError::Config(format!(
                    "AI_REQUEST_TIMEOUT_SECS must be a valid u64, got {raw:?}"
                ))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url: non_empty_var("AI_API_URL"),
            api_key: non_empty_var("AI_API_KEY"),
            model: non_empty_var("AI_MODEL").unwrap_or_default(),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    /// Configuration pointing at a given endpoint; used by tests and tooling.
    pub fn with_endpoint(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Whether both URL and credential are present.
    pub fn is_complete(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
