use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use autopsy_operator::{Collaborators, LogFormat, Operator, OperatorConfig};
use autopsy_reasoning::{ReasoningClient, ReasoningConfig};
use autopsy_store::KubeClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "autopsy_operator=info,autopsy_store=info,autopsy_reasoning=info,autopsy_events=info";

/// How long in-flight passes get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = OperatorConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        poll_interval_secs = config.poll_interval.as_secs(),
        workers = config.worker_count,
        diagnosis_timeout_secs = config.diagnosis_timeout.as_secs(),
        max_attempts = config.reasoning_max_attempts,
        "Loaded operator configuration",
    );

    // --- Cluster access ---
    let kube = Arc::new(KubeClient::from_env().context("failed to configure cluster access")?);
    tracing::info!(api_server = %kube.api_server(), "Cluster client created");

    // --- Reasoning service ---
    let reasoning_config = ReasoningConfig::from_env()?;
    if !reasoning_config.is_complete() {
        tracing::warn!("AI_API_URL or AI_API_KEY is not set; every diagnosis will fail");
    }
    let reasoner = Arc::new(ReasoningClient::new(reasoning_config)?);

    // --- Controllers ---
    let operator = Operator::start(
        Collaborators {
            store: kube.clone(),
            logs: kube.clone(),
            events: kube,
            reasoner,
        },
        &config,
    );

    shutdown_signal().await;
    operator.shutdown(SHUTDOWN_GRACE).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
