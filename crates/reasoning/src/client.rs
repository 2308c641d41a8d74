//! HTTP client for the reasoning endpoint.
//!
//! One request per call, no internal retry: transient failures are
//! reported to the caller, which owns the retry policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ReasoningConfig;
use crate::error::ReasoningError;
use crate::prompt::{self, Message};

/// Fixed sampling temperature; low to keep answers stable.
pub const TEMPERATURE: f32 = 0.2;

/// Structured answer returned by the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub root_cause: String,
    pub suggestion: String,
}

/// Something that can explain a pod failure.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn diagnose(
        &self,
        pod_name: &str,
        trigger_reason: &str,
        logs: &str,
    ) -> Result<Diagnosis, ReasoningError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ReasoningClient {
    client: reqwest::Client,
    config: ReasoningConfig,
}

impl ReasoningClient {
    pub fn new(config: ReasoningConfig) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    /// Ensure the response has a success status code, returning an
    /// [`ReasoningError::Api`] with the body text otherwise.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ReasoningError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ReasoningError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Reasoner for ReasoningClient {
    async fn diagnose(
        &self,
        pod_name: &str,
        trigger_reason: &str,
        logs: &str,
    ) -> Result<Diagnosis, ReasoningError> {
        let (Some(api_url), Some(api_key)) = (&self.config.api_url, &self.config.api_key) else {
            return Err(ReasoningError::Config(
                "AI_API_URL or AI_API_KEY is not set".into(),
            ));
        };

        let body = CompletionRequest {
            model: &self.config.model,
            messages: prompt::build(pod_name, trigger_reason, logs),
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        tracing::debug!(pod = %pod_name, model = %self.config.model, "Calling reasoning service");

        let response = self
            .client
            .post(api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let raw = response.text().await?;

        parse_completion(&raw)
    }
}

/// Parse a completion envelope and the JSON result in its first choice.
pub fn parse_completion(raw: &str) -> Result<Diagnosis, ReasoningError> {
    let envelope: CompletionResponse =
        serde_json::from_str(raw).map_err(|e| ReasoningError::Parse {
            reason: format!("invalid envelope: {e}"),
            content: raw.to_string(),
        })?;

    let Some(choice) = envelope.choices.into_iter().next() else {
        return Err(ReasoningError::Parse {
            reason: "no choices".into(),
            content: raw.to_string(),
        });
    };

    let content = choice.message.content;
    serde_json::from_str(&content).map_err(|e| ReasoningError::Parse {
        reason: format!("invalid result: {e}"),
        content,
    })
}
