//! Error types for govcon-etl
//!
//! Only fatal conditions are errors. Parse anomalies become defaults and
//! batch failures are counted in the load progress.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    /// Source file could not be opened or read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream or decode error (including gzip corruption surfaced by the CSV reader)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export lacks a natural-key column, so no row could be upserted
    #[error("{table}: source has no {column} column")]
    MissingKeyColumn { table: String, column: String },

    #[error("{table}: no files matching {pattern} in {dir}")]
    NoSourceFiles {
        table: String,
        pattern: String,
        dir: String,
    },

    #[error("Unknown import table: {0}")]
    UnknownTable(String),

    /// Blocking reader task panicked or was cancelled
    #[error("Reader task failed: {0}")]
    Reader(String),

    #[error(transparent)]
    Common(#[from] govcon_common::Error),
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;
