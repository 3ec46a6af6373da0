//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` lines from stdin and writes `ResponseEnvelope`
//! and `EventEnvelope` lines to stdout. Tracing goes to stderr so stdout
//! stays a clean protocol channel.

use krishi::host::stdio::run_stdio_bridge;
use krishi::{AdvisorRuntime, KrishiConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("krishi-host starting");

    let config = KrishiConfig::load()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    let runtime = AdvisorRuntime::start(config)
        .map_err(|e| anyhow::anyhow!("failed to start runtime: {e}"))?;

    if runtime.config().locale.resolve_on_start {
        let resolving = Arc::clone(&runtime);
        tokio::spawn(async move {
            resolving.resolve_locale().await;
        });
    }

    run_stdio_bridge(runtime).await.map_err(|e| {
        tracing::error!(error = %e, "krishi-host exited with error");
        anyhow::anyhow!("krishi-host failed: {e}")
    })?;

    tracing::info!("krishi-host shut down cleanly");
    Ok(())
}
