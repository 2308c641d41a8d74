use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Output format of the fmt tracing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse from the `LOG_FORMAT` value, treating unknown values as text.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Operator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when `None`.
    pub watch_namespace: Option<String>,
    /// Interval between informer list calls.
    pub poll_interval: Duration,
    /// Interval between full cache republishes.
    pub resync_interval: Duration,
    /// Concurrent workers per controller.
    pub worker_count: usize,
    /// Wall-clock bound on one reasoning call.
    pub diagnosis_timeout: Duration,
    /// Reasoning attempts per diagnosis before it is failed for good.
    pub reasoning_max_attempts: u32,
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            poll_interval: Duration::from_secs(2),
            resync_interval: Duration::from_secs(300),
            worker_count: 4,
            diagnosis_timeout: Duration::from_secs(45),
            reasoning_max_attempts: 1,
            log_format: LogFormat::Text,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default          |
    /// |--------------------------|------------------|
    /// | `WATCH_NAMESPACE`        | (all namespaces) |
    /// | `POLL_INTERVAL_SECS`     | `2`              |
    /// | `RESYNC_INTERVAL_SECS`   | `300`            |
    /// | `WORKER_COUNT`           | `4`              |
    /// | `DIAGNOSIS_TIMEOUT_SECS` | `45`             |
    /// | `REASONING_MAX_ATTEMPTS` | `1`              |
    /// | `LOG_FORMAT`             | `text`           |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let worker_count: usize = parse_var("WORKER_COUNT", "a positive integer")?
            .unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(ConfigError {
                name: "WORKER_COUNT",
                expected: "a positive integer",
                value: "0".into(),
            });
        }

        let reasoning_max_attempts: u32 =
            parse_var("REASONING_MAX_ATTEMPTS", "a positive integer")?
                .unwrap_or(defaults.reasoning_max_attempts)
                .max(1);

        Ok(Self {
            watch_namespace: var("WATCH_NAMESPACE"),
            poll_interval: secs_var("POLL_INTERVAL_SECS")?.unwrap_or(defaults.poll_interval),
            resync_interval: secs_var("RESYNC_INTERVAL_SECS")?
                .unwrap_or(defaults.resync_interval),
            worker_count,
            diagnosis_timeout: secs_var("DIAGNOSIS_TIMEOUT_SECS")?
                .unwrap_or(defaults.diagnosis_timeout),
            reasoning_max_attempts,
            log_format: var("LOG_FORMAT")
                .map(|v| LogFormat::from_str(&v))
                .unwrap_or_default(),
        })
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError {
            name,
            expected,
            value: raw,
        }),
    }
}

fn secs_var(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_var::<u64>(name, "a number of seconds")?.map(Duration::from_secs))
}
