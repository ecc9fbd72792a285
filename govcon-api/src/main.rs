//! govcon-api - read API over contractor metrics
//!
//! Serves ETL run logs, iceberg opportunities and contractor profiles
//! from the SQLite database the ETL writes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use govcon_api::rate_limit::{spawn_sweeper, InMemoryStore, RateLimiter};
use govcon_api::{build_router, AppState};
use govcon_common::config::{load_toml_config, Overrides};
use govcon_common::db::init_database;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for govcon-api
#[derive(Parser, Debug)]
#[command(name = "govcon-api")]
#[command(about = "Read API for GovCon contractor metrics")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/govcon/config.toml)
    #[arg(long, env = "GOVCON_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "GOVCON_DATABASE")]
    database: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "GOVCON_API_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config decides the log level, so config loading logs through a
    // temporary subscriber
    let bootstrap = tracing_subscriber::fmt().finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        load_toml_config(args.config.as_deref())
    })
    .context("Failed to load configuration")?
    .with_overrides(Overrides {
        database_path: args.database.clone(),
        import_dir: None,
        api_port: args.port,
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting GovCon API (govcon-api) v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let limiter = Arc::new(RateLimiter::new(
        Arc::new(InMemoryStore::new()),
        config.api.rate_limits.clone(),
    ));
    for policy in limiter.policies() {
        info!(
            "Rate limit '{}': {} requests per {} ms by {}",
            policy.name,
            policy.limit,
            policy.window_ms,
            policy.scope.as_str()
        );
    }
    let sweeper = spawn_sweeper(
        limiter.clone(),
        Duration::from_secs(config.api.sweep_interval_secs.max(1)),
    );

    let app = build_router(AppState::new(pool.clone(), limiter));

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.api.host, config.api.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("govcon-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.abort();
    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
