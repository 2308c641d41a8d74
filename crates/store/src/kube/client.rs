//! REST client for the Kubernetes API server.

use async_trait::async_trait;
use autopsy_core::event::ClusterEvent;
use autopsy_core::types::Resource;
use autopsy_core::{ObjectKey, Pod, PodDiagnosis};
use futures::StreamExt;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::config::KubeConfig;
use super::paths;
use crate::error::{LogError, StoreError};
use crate::{EventRecorder, LogSource, ResourceStore};

const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";

/// Generic list envelope returned by collection endpoints.
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    items: Vec<T>,
}

/// HTTP client for one API server.
///
/// Cheap to share behind an `Arc`; the inner [`reqwest::Client`] pools
/// connections.
pub struct KubeClient {
    client: reqwest::Client,
    api_server: String,
    token: Option<String>,
}

impl KubeClient {
    pub fn new(config: KubeConfig) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(pem) = &config.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            api_server: config.api_server,
            token: config.token,
        })
    }

    /// Build a client from [`KubeConfig::from_env`].
    pub fn from_env() -> Result<Self, StoreError> {
        Self::new(KubeConfig::from_env()?)
    }

    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    // ---- private helpers ----

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.api_server, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let response = self.request(Method::GET, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::parse_response(response).await?))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, StoreError> {
        let response = self.request(Method::GET, path).query(query).send().await?;
        let list: ObjectList<T> = Self::parse_response(response).await?;
        Ok(list.items)
    }

    /// Ensure the response has a success status code, returning an
    /// [`StoreError::Api`] with the body text otherwise.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ResourceStore for KubeClient {
    async fn get_pod(&self, key: &ObjectKey) -> Result<Option<Pod>, StoreError> {
        self.get_optional(&paths::pod(key)).await
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, StoreError> {
        self.list(&paths::pods(namespace), &[]).await
    }

    async fn get_diagnosis(&self, key: &ObjectKey) -> Result<Option<PodDiagnosis>, StoreError> {
        self.get_optional(&paths::diagnosis(key)).await
    }

    async fn list_diagnoses(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<PodDiagnosis>, StoreError> {
        self.list(&paths::diagnoses(namespace), &[]).await
    }

    async fn list_diagnoses_for_pod(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<Vec<PodDiagnosis>, StoreError> {
        // No label selector: the `diagnosed-pod` label is optional and
        // mutable, only `spec.podName` identifies the target.
        let items: Vec<PodDiagnosis> = self.list(&paths::diagnoses(Some(namespace)), &[]).await?;
        Ok(items
            .into_iter()
            .filter(|d| d.spec.pod_name == pod_name)
            .collect())
    }

    async fn create_diagnosis(
        &self,
        diagnosis: &PodDiagnosis,
    ) -> Result<PodDiagnosis, StoreError> {
        let namespace = diagnosis.namespace();
        if namespace.is_empty() {
            return Err(StoreError::Invalid(
                "diagnosis has no metadata.namespace".into(),
            ));
        }

        let response = self
            .request(Method::POST, &paths::diagnoses(Some(namespace)))
            .json(diagnosis)
            .send()
            .await?;
        let created: PodDiagnosis = Self::parse_response(response).await?;

        tracing::debug!(diagnosis = %created.key(), "Created PodDiagnosis");
        Ok(created)
    }

    async fn patch_diagnosis_status(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<PodDiagnosis, StoreError> {
        let response = self
            .request(Method::PATCH, &paths::diagnosis_status(key))
            .header(reqwest::header::CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)
            .body(serde_json::to_vec(patch)?)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT => {
                let message = response.text().await.unwrap_or_default();
                Err(StoreError::Conflict {
                    key: key.clone(),
                    message,
                })
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                kind: "PodDiagnosis",
                key: key.clone(),
            }),
            _ => Self::parse_response(response).await,
        }
    }
}

#[async_trait]
impl LogSource for KubeClient {
    async fn tail_logs(&self, key: &ObjectKey, tail_lines: i64) -> Result<String, LogError> {
        let tail = tail_lines.to_string();
        let response = self
            .request(Method::GET, &paths::pod_log(key))
            .query(&[("tailLines", tail.as_str())])
            .send()
            .await
            .map_err(|e| LogError::Open(e.to_string()))?;

        let response = Self::ensure_success(response)
            .await
            .map_err(|e| LogError::Open(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LogError::Read(e.to_string()))?;
            buf.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[async_trait]
impl EventRecorder for KubeClient {
    async fn record(&self, event: &ClusterEvent) -> Result<(), StoreError> {
        let namespace = &event.involved_object.namespace;
        let response = self
            .request(Method::POST, &paths::events(namespace))
            .json(event)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
