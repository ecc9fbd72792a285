//! govcon-etl - batch loader and aggregation passes
//!
//! Loads analytics exports from the import directory into SQLite, then
//! rebuilds the derived iceberg and profile tables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use govcon_common::config::{load_toml_config, Overrides};
use govcon_common::db::init_database;
use govcon_etl::jobs::select_tables;
use govcon_etl::{run_all, run_iceberg, run_imports, run_profiles, LoadReport};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for govcon-etl
#[derive(Parser, Debug)]
#[command(name = "govcon-etl")]
#[command(about = "Batch loader for GovCon analytics exports")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/govcon/config.toml)
    #[arg(long, global = true, env = "GOVCON_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "GOVCON_DATABASE")]
    database: Option<PathBuf>,

    /// Directory holding the `*.csv.gz` exports
    #[arg(long, global = true, env = "GOVCON_IMPORT_DIR")]
    import_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load import tables (all of them unless --table is given)
    Load {
        /// Destination table to load; repeatable
        #[arg(long = "table", value_name = "NAME")]
        tables: Vec<String>,
    },
    /// Recompute iceberg opportunities from monthly metrics
    Iceberg,
    /// Rebuild contractor profiles
    Profiles,
    /// Load every table, then run both aggregation passes
    Run,
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
            import_dir: args.import_dir.clone(),
            api_port: None,
        });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting GovCon ETL (govcon-etl) v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());
    info!("Import directory: {}", config.import_dir.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    match args.command {
        Command::Load { tables } => {
            let tables = select_tables(&tables)?;
            let reports = run_imports(&pool, &config, &tables).await;
            summarize(&reports);
        }
        Command::Iceberg => {
            let report = run_iceberg(&pool, &config).await;
            summarize(std::slice::from_ref(&report));
        }
        Command::Profiles => {
            let summary = run_profiles(&pool, &config).await;
            info!(
                "Profiles: {} written, {} UEIs mapped, {} deactivated, {} errors",
                summary.profiles_created,
                summary.ueis_mapped,
                summary.profiles_deactivated,
                summary.errors.len()
            );
            summarize(std::slice::from_ref(&summary.report));
        }
        Command::Run => {
            let summary = run_all(&pool, &config).await;
            summarize(&summary.imports);
            summarize(std::slice::from_ref(&summary.iceberg));
            summarize(std::slice::from_ref(&summary.profiles.report));
        }
    }

    pool.close().await;
    Ok(())
}

fn summarize(reports: &[LoadReport]) {
    for report in reports {
        let line = format!(
            "{}: {} ({} processed, {} new, {} updated, {} skipped, {} failed, {} ms)",
            report.table,
            report.status.as_str(),
            report.progress.processed,
            report.records_created,
            report.records_updated,
            report.progress.skipped,
            report.progress.failed,
            report.duration_ms
        );
        match &report.fatal_error {
            Some(e) => warn!("{} - {}", line, e),
            None => info!("{}", line),
        }
    }
}
