//! ETL run log
//!
//! One row per table load or aggregation pass, written when the run ends.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Outcome of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Every row was written or skipped
    Success,
    /// At least one batch or row failed, the rest completed
    Partial,
    /// Fatal abort
    Failed,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Success => "success",
            LoadStatus::Partial => "partial",
            LoadStatus::Failed => "failed",
        }
    }
}

/// Kind of job that produced a run-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoadType {
    /// File import from the warehouse export
    Import,
    /// Derived-table rebuild (iceberg, profiles)
    Aggregation,
}

/// Run-log record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoadLogEntry {
    pub table_name: String,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub records_skipped: i64,
    pub records_failed: i64,
    pub load_start_time: DateTime<Utc>,
    pub load_end_time: DateTime<Utc>,
    pub load_duration_ms: i64,
    pub load_status: LoadStatus,
    pub error_message: Option<String>,
    pub loaded_by: String,
    pub load_type: LoadType,
}

/// Stored run-log record with its row id
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoadLogRecord {
    pub id: i64,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub entry: LoadLogEntry,
}

/// Append a run-log record, returning its id
pub async fn record_load(pool: &SqlitePool, entry: &LoadLogEntry) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO etl_load_log (
            table_name, records_processed, records_inserted, records_updated,
            records_skipped, records_failed, load_start_time, load_end_time,
            load_duration_ms, load_status, error_message, loaded_by, load_type
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.table_name)
    .bind(entry.records_processed)
    .bind(entry.records_inserted)
    .bind(entry.records_updated)
    .bind(entry.records_skipped)
    .bind(entry.records_failed)
    .bind(entry.load_start_time)
    .bind(entry.load_end_time)
    .bind(entry.load_duration_ms)
    .bind(entry.load_status)
    .bind(&entry.error_message)
    .bind(&entry.loaded_by)
    .bind(entry.load_type)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent run-log records, newest first
pub async fn recent_loads(pool: &SqlitePool, limit: i64) -> Result<Vec<LoadLogRecord>> {
    let records = sqlx::query_as::<_, LoadLogRecord>(
        r#"
        SELECT id, table_name, records_processed, records_inserted, records_updated,
               records_skipped, records_failed, load_start_time, load_end_time,
               load_duration_ms, load_status, error_message, loaded_by, load_type
        FROM etl_load_log
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Most recent run-log record for one table
pub async fn latest_load_for_table(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<Option<LoadLogRecord>> {
    let record = sqlx::query_as::<_, LoadLogRecord>(
        r#"
        SELECT id, table_name, records_processed, records_inserted, records_updated,
               records_skipped, records_failed, load_start_time, load_end_time,
               load_duration_ms, load_status, error_message, loaded_by, load_type
        FROM etl_load_log
        WHERE table_name = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(table_name)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}
