//! News aggregator binary entrypoint.
//! Loads config, builds the aggregator, and runs until SIGINT/SIGTERM.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_aggregator::{AppConfig, NewsAggregator};

const ENV_LOG_FORMAT: &str = "NEWS_AGGREGATOR_LOG_FORMAT";

/// Compact logs by default; `NEWS_AGGREGATOR_LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_aggregator=info,warn"));

    let json = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("failed to load config")?;
    tracing::info!(
        database = %cfg.database.url,
        sources = cfg.sources.len(),
        web = cfg.web.bind_addr.as_deref().unwrap_or("disabled"),
        "config loaded"
    );

    let aggregator = NewsAggregator::from_config(&cfg)
        .await
        .context("failed to create news aggregator")?;
    aggregator
        .start()
        .await
        .context("failed to start news aggregator")?;
    tracing::info!("news aggregator started");

    shutdown_signal().await;

    tracing::info!("stopping news aggregator");
    let t0 = Instant::now();
    aggregator.stop().await;
    tracing::info!(elapsed_ms = t0.elapsed().as_millis() as u64, "news aggregator stopped");
    Ok(())
}
