//! condnum HTTP server
//!
//! Serves the numeric condition store over REST.

use anyhow::Result;
use condnum_server::api::create_router;
use condnum_server::bootstrap::build_application;
use condnum_server::config::{LogConfig, LogFormat, ServerConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Initialize tracing
    init_tracing(&config.log)?;
    info!(
        addr = %config.api.addr(),
        backend = %config.db.backend,
        cache = config.cache.enabled,
        "Loaded configuration"
    );

    let app = build_application(&config).await?;
    let router = create_router(app.service.clone());

    let addr = config.api.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("✓ Server listening on http://{}", addr);
    info!("  Health check: http://{}/health", addr);
    info!("  Conditions API: http://{}/v1/conditions", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    app.storage.close().await?;

    Ok(())
}

/// Initialize tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log: &LogConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log.level))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", log.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match log.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
