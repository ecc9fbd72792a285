//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table the
//! loaders, aggregation passes and API read from. All statements are
//! idempotent, so this runs on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when the schema changes
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Applied to every pooled connection. WAL lets the API read while a
    // load is writing.
    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(connect_options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Snowflake import targets
    create_contractor_universe_table(pool).await?;
    create_monthly_metrics_table(pool).await?;
    create_peer_comparisons_table(pool).await?;
    create_network_relationships_table(pool).await?;

    // Derived tables
    create_iceberg_opportunities_table(pool).await?;
    create_contractor_profiles_table(pool).await?;
    create_profile_uei_map_table(pool).await?;

    create_load_log_table(pool).await?;

    record_schema_version(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    let current: Option<i32> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await?;

    match current {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            warn!(
                "Database schema version ({}) is newer than code version ({})",
                v, CURRENT_SCHEMA_VERSION
            );
        }
        Some(v) if v == CURRENT_SCHEMA_VERSION => {}
        _ => {
            sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
                .bind(CURRENT_SCHEMA_VERSION)
                .execute(pool)
                .await?;
            info!("Database schema at v{}", CURRENT_SCHEMA_VERSION);
        }
    }

    Ok(())
}

async fn create_contractor_universe_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contractor_universe (
            uei TEXT PRIMARY KEY,
            legal_name TEXT,
            parent_uei TEXT,
            lifetime_revenue REAL NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 0,
            is_prime INTEGER NOT NULL DEFAULT 0,
            is_sub INTEGER NOT NULL DEFAULT 0,
            is_hybrid INTEGER NOT NULL DEFAULT 0,
            first_award_date TEXT,
            last_award_date TEXT,
            agency_revenue TEXT,
            naics_revenue TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contractor_universe_parent ON contractor_universe(parent_uei)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_monthly_metrics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS monthly_metrics (
            uei TEXT NOT NULL,
            month TEXT NOT NULL,
            total_revenue REAL NOT NULL DEFAULT 0,
            prime_revenue REAL NOT NULL DEFAULT 0,
            sub_revenue REAL NOT NULL DEFAULT 0,
            award_amount REAL NOT NULL DEFAULT 0,
            contract_count INTEGER NOT NULL DEFAULT 0,
            revenue_growth_pct REAL,
            award_growth_pct REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (uei, month)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_peer_comparisons_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS peer_comparisons (
            uei TEXT NOT NULL,
            peer_group TEXT NOT NULL,
            month TEXT NOT NULL,
            revenue_percentile REAL,
            growth_percentile REAL,
            contract_count_percentile REAL,
            peer_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (uei, peer_group, month)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_network_relationships_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS network_relationships (
            prime_uei TEXT NOT NULL,
            sub_uei TEXT NOT NULL,
            month TEXT NOT NULL,
            shared_revenue REAL NOT NULL DEFAULT 0,
            shared_contracts INTEGER NOT NULL DEFAULT 0,
            relationship_strength REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (prime_uei, sub_uei, month)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_iceberg_opportunities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS iceberg_opportunities (
            uei TEXT PRIMARY KEY,
            prime_revenue REAL NOT NULL DEFAULT 0,
            sub_revenue REAL NOT NULL DEFAULT 0,
            total_revenue REAL NOT NULL DEFAULT 0,
            sub_to_prime_ratio REAL,
            hidden_revenue_pct REAL NOT NULL DEFAULT 0,
            opportunity_score REAL NOT NULL DEFAULT 0,
            opportunity_tier TEXT NOT NULL DEFAULT 'low',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_contractor_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contractor_profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_key TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            primary_uei TEXT NOT NULL,
            uei_count INTEGER NOT NULL DEFAULT 0,
            total_lifetime_revenue REAL NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_prime INTEGER NOT NULL DEFAULT 0,
            is_sub INTEGER NOT NULL DEFAULT 0,
            is_hybrid INTEGER NOT NULL DEFAULT 0,
            avg_revenue_percentile REAL,
            avg_growth_percentile REAL,
            agency_hhi REAL NOT NULL DEFAULT 0,
            concentration_risk TEXT NOT NULL DEFAULT 'low',
            top_agencies TEXT NOT NULL DEFAULT '[]',
            top_naics TEXT NOT NULL DEFAULT '[]',
            last_rebuild_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_profile_uei_map_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_uei_map (
            uei TEXT PRIMARY KEY,
            profile_key TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profile_uei_map_profile ON profile_uei_map(profile_key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Run log: the only append-only table
async fn create_load_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etl_load_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            records_processed INTEGER NOT NULL DEFAULT 0,
            records_inserted INTEGER NOT NULL DEFAULT 0,
            records_updated INTEGER NOT NULL DEFAULT 0,
            records_skipped INTEGER NOT NULL DEFAULT 0,
            records_failed INTEGER NOT NULL DEFAULT 0,
            load_start_time TEXT NOT NULL,
            load_end_time TEXT NOT NULL,
            load_duration_ms INTEGER NOT NULL DEFAULT 0,
            load_status TEXT NOT NULL,
            error_message TEXT,
            loaded_by TEXT NOT NULL,
            load_type TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_etl_load_log_table ON etl_load_log(table_name, load_start_time)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
