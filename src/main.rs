//! dpscope: Differential-privacy analytics server
//!
//! Main entry point for the HTTP service.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dpscope::adapters::http;
use dpscope::adapters::laplace::LaplaceAdapter;
use dpscope::adapters::logistic::LogisticRegression;
use dpscope::application::{AnalyticsConfig, AnalyticsService};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5050";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    //
    // - stdout (default): so container logs work
    // - file: append to DPSCOPE_LOG_FILE
    let log_mode = std::env::var("DPSCOPE_LOG_MODE").unwrap_or_else(|_| "stdout".to_string());

    let (writer, _guard) = if log_mode == "file" {
        let log_file = std::env::var("DPSCOPE_LOG_FILE")
            .unwrap_or_else(|_| "./data/dpscope.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("opening log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    tracing::info!("Starting dpscope...");

    let service = AnalyticsService::new(
        LaplaceAdapter::new(),
        LogisticRegression::new(),
        AnalyticsConfig::from_env_or_default(),
    );
    let app = http::router(service);

    let addr = std::env::var("DPSCOPE_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("dpscope shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
