//! Exporter binary entry point.
//!
//! Wires configuration, the Snowflake client, the collector scheduler, and
//! the HTTP server together. Startup is fail-fast: invalid configuration or
//! rejected credentials terminate the process before the port is bound.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use snowflake_exporter::{
    collector::{catalog, CollectorScheduler},
    config::AppConfig,
    health::HealthState,
    registry::MetricRegistry,
    server::{create_router, AppState},
    warehouse::{SnowflakeClient, Warehouse},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Snowflake Prometheus Exporter
#[derive(Parser, Debug)]
#[command(name = "snowflake-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file; falls back to SNOWFLAKE_* environment
    /// variables when omitted
    #[arg(short, long, env = "SNOWFLAKE_EXPORTER_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "EXPORTER_BIND")]
    bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "EXPORTER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,snowflake_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration (CLI > ENV > config file)
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => {
            tracing::info!("No config file given, reading SNOWFLAKE_* environment");
            AppConfig::from_env()?
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!(
        account = %config.warehouse.account,
        user = %config.warehouse.user,
        "Connecting to Snowflake"
    );

    // Verify credentials before anything is bound; bad credentials are fatal.
    let client = Arc::new(SnowflakeClient::new(&config.warehouse)?);
    client.authenticate().await?;
    tracing::info!("Snowflake authentication succeeded");

    let registry = Arc::new(MetricRegistry::new(catalog::descriptors()));
    let health = Arc::new(HealthState::new());

    // Spawn one scheduling loop per enabled collector.
    let scheduler = CollectorScheduler::new(
        Arc::clone(&client) as Arc<dyn Warehouse>,
        Arc::clone(&registry),
        Arc::clone(&health),
    );
    for spec in catalog::builtin_collectors(&config.collectors) {
        let name = spec.name;
        if let Err(e) = scheduler.spawn(spec) {
            tracing::error!(collector = %name, error = %e, "Failed to spawn collector");
        }
    }
    tracing::info!(collectors = scheduler.collector_count(), "Collectors started");

    let app = create_router(AppState { registry, health });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Exporter listening on: http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(scheduler: CollectorScheduler) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down collectors...");
    scheduler.shutdown().await;
}
