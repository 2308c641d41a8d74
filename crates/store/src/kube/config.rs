//! Connection settings for the Kubernetes API server.

use std::path::Path;
use std::time::Duration;

use crate::error::StoreError;

/// Service-account mount inside a pod.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// HTTP timeout for a single API request (log reads included).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// Base URL, e.g. `https://10.96.0.1:443`.
    pub api_server: String,
    /// Bearer token; requests are unauthenticated when absent.
    pub token: Option<String>,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_pem: Option<Vec<u8>>,
    pub request_timeout: Duration,
}

impl KubeConfig {
    /// Resolve configuration from the environment.
    ///
    /// | Env Var                   | Fallback                              |
    /// |---------------------------|---------------------------------------|
    /// | `KUBE_API_SERVER`         | `https://$KUBERNETES_SERVICE_HOST:$KUBERNETES_SERVICE_PORT` |
    /// | `KUBE_TOKEN`              | service-account `token` file          |
    /// | `KUBE_CA_FILE`            | service-account `ca.crt` file         |
    pub fn from_env() -> Result<Self, StoreError> {
        let api_server = match std::env::var("KUBE_API_SERVER") {
            Ok(url) => url.trim_end_matches('/').to_string(),
            Err(_) => in_cluster_server()?,
        };

        let token = match std::env::var("KUBE_TOKEN") {
            Ok(token) => Some(token),
            Err(_) => read_optional(&Path::new(SERVICE_ACCOUNT_DIR).join("token"))?
                .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string()),
        };

        let ca_path = std::env::var("KUBE_CA_FILE")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt"));
        let ca_pem = read_optional(&ca_path)?;

        Ok(Self {
            api_server,
            token,
            ca_pem,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

fn in_cluster_server() -> Result<String, StoreError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
        StoreError::Config(
            "KUBE_API_SERVER is not set and KUBERNETES_SERVICE_HOST is missing \
             (not running in a cluster?)"
                .into(),
        )
    })?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
    Ok(server_url(&host, &port))
}

/// Build an HTTPS URL, bracketing IPv6 literals.
pub fn server_url(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Config(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}
