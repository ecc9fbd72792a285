//! Batch loader
//!
//! Rows accumulate in a [`BatchSink`] and are flushed as one multi-row
//! upsert per batch. A failed flush marks that batch's rows failed and the
//! load continues. Fatal errors (unreadable source, missing key column)
//! abort the table. Every load ends with one run-log record.

use crate::error::{LoadError, LoadResult};
use crate::reader::{spawn_reader, ReadEvent};
use crate::tables::TableSpec;
use crate::writer::{BatchWriter, RowValues};
use chrono::{DateTime, Utc};
use govcon_common::config::EtlConfig;
use govcon_common::db::{record_load, LoadLogEntry, LoadStatus, LoadType};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-load settings
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub delimiter: u8,
    pub loaded_by: String,
    pub load_type: LoadType,
}

impl LoadOptions {
    /// Import options for one table from the `[etl]` config section
    pub fn for_import(etl: &EtlConfig, spec: &TableSpec) -> LoadResult<Self> {
        Ok(Self {
            batch_size: etl.batch_size_for(spec.table),
            delimiter: etl.delimiter_byte()?,
            loaded_by: etl.loaded_by.clone(),
            load_type: LoadType::Import,
        })
    }

    /// Import options used only to record a load that could not start
    pub(crate) fn unresolved_import(etl: &EtlConfig, spec: &TableSpec) -> Self {
        Self {
            batch_size: etl.batch_size_for(spec.table),
            delimiter: b',',
            loaded_by: etl.loaded_by.clone(),
            load_type: LoadType::Import,
        }
    }

    /// Options for a derived-table pass
    pub fn for_aggregation(etl: &EtlConfig, batch_size: usize) -> Self {
        Self {
            batch_size,
            delimiter: b',',
            loaded_by: etl.loaded_by.clone(),
            load_type: LoadType::Aggregation,
        }
    }
}

/// Running counts for one load
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadProgress {
    /// Rows read from the source, including skipped ones
    pub processed: u64,
    /// Rows written by successful flushes
    pub inserted: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Flushes attempted
    pub batches: u64,
    pub errors: Vec<String>,
}

/// Result of a table load or aggregation pass
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub status: LoadStatus,
    pub progress: LoadProgress,
    /// Net new rows in the destination table
    pub records_created: i64,
    /// Rows written that already existed
    pub records_updated: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub fatal_error: Option<String>,
    /// Run-log row id, if the log was written
    pub log_id: Option<i64>,
}

/// Accumulates rows and flushes them in fixed-size batches
pub struct BatchSink<'a> {
    writer: BatchWriter<'a>,
    batch_size: usize,
    pending: Vec<RowValues>,
    progress: LoadProgress,
}

impl<'a> BatchSink<'a> {
    /// Batch sizes above the bind-parameter limit are clamped
    pub fn new(pool: &'a SqlitePool, spec: &'static TableSpec, batch_size: usize) -> Self {
        let max_rows = spec.max_batch_rows();
        let batch_size = if batch_size > max_rows {
            warn!(
                table = spec.table,
                requested = batch_size,
                clamped = max_rows,
                "Batch size exceeds SQLite bind limit, clamping"
            );
            max_rows
        } else {
            batch_size.max(1)
        };

        Self {
            writer: BatchWriter::new(pool, spec),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            progress: LoadProgress::default(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn writer(&self) -> &BatchWriter<'a> {
        &self.writer
    }

    /// Queue a row, flushing when the batch is full
    pub async fn push(&mut self, row: RowValues) {
        self.progress.processed += 1;
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Count a row that cannot be written
    pub fn skip(&mut self, reason: &str) {
        self.progress.processed += 1;
        self.progress.skipped += 1;
        debug!(table = self.writer.table(), reason, "Row skipped");
    }

    /// Upsert pending rows; a failure marks them all failed
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        self.progress.batches += 1;
        let batch = self.progress.batches;
        let rows = self.pending.len() as u64;

        match self.writer.upsert(&self.pending).await {
            Ok(_) => {
                self.progress.inserted += rows;
                debug!(
                    table = self.writer.table(),
                    batch,
                    rows,
                    total = self.progress.inserted,
                    "Batch upserted"
                );
            }
            Err(e) => {
                self.progress.failed += rows;
                warn!(table = self.writer.table(), batch, rows, error = %e, "Batch upsert failed");
                self.progress
                    .errors
                    .push(format!("batch {} ({} rows): {}", batch, rows, e));
            }
        }

        self.pending.clear();
    }

    /// Flush the trailing partial batch and return the counts
    pub async fn finish(mut self) -> LoadProgress {
        self.flush().await;
        self.progress
    }

    /// Stop without flushing; pending rows count as failed
    pub fn abandon(mut self) -> LoadProgress {
        self.progress.failed += self.pending.len() as u64;
        self.progress
    }
}

/// Load one table from its source shards
///
/// Never returns an error: a fatal failure is reported with status
/// `failed` and recorded in the run log, so the caller can move on.
pub async fn load_table(
    pool: &SqlitePool,
    spec: &'static TableSpec,
    paths: &[PathBuf],
    options: &LoadOptions,
) -> LoadReport {
    let started_at = Utc::now();
    let timer = Instant::now();
    info!(table = spec.table, files = paths.len(), "Starting load");

    let mut sink = BatchSink::new(pool, spec, options.batch_size);
    let before = sink.writer().row_count().await;
    let (before, outcome) = match before {
        Ok(count) => (Some(count), stream_files(&mut sink, spec, paths, options).await),
        Err(e) => (None, Err(LoadError::from(e))),
    };

    let (progress, fatal) = match outcome {
        Ok(()) => (sink.finish().await, None),
        Err(e) => (sink.abandon(), Some(e)),
    };

    let after = BatchWriter::new(pool, spec).row_count().await.ok();
    let created = match (before, after) {
        (Some(b), Some(a)) => (a - b).max(0),
        _ => 0,
    };

    finish_load(pool, spec.table, options, started_at, timer, progress, created, fatal).await
}

async fn stream_files(
    sink: &mut BatchSink<'_>,
    spec: &'static TableSpec,
    paths: &[PathBuf],
    options: &LoadOptions,
) -> LoadResult<()> {
    for path in paths {
        info!(table = spec.table, file = %path.display(), "Reading source file");
        let file = File::open(path)?;
        let (mut rx, handle) = spawn_reader(file, spec, options.delimiter, sink.batch_size());

        while let Some(item) = rx.recv().await {
            match item? {
                ReadEvent::Row(values) => sink.push(values).await,
                ReadEvent::Skipped(reason) => sink.skip(&reason),
            }
        }

        handle
            .await
            .map_err(|e| LoadError::Reader(e.to_string()))?;
    }

    Ok(())
}

/// Derive the status, write the run log, and build the report
#[allow(clippy::too_many_arguments)]
pub async fn finish_load(
    pool: &SqlitePool,
    table: &str,
    options: &LoadOptions,
    started_at: DateTime<Utc>,
    timer: Instant,
    progress: LoadProgress,
    records_created: i64,
    fatal: Option<LoadError>,
) -> LoadReport {
    let finished_at = Utc::now();
    let duration_ms = timer.elapsed().as_millis() as i64;

    let status = if fatal.is_some() {
        LoadStatus::Failed
    } else if progress.failed > 0 {
        LoadStatus::Partial
    } else {
        LoadStatus::Success
    };

    let fatal_error = fatal.map(|e| e.to_string());
    let records_updated = (progress.inserted as i64 - records_created).max(0);

    let mut messages: Vec<String> = Vec::new();
    if let Some(e) = &fatal_error {
        messages.push(e.clone());
    }
    messages.extend(progress.errors.iter().cloned());
    let error_message = (!messages.is_empty()).then(|| messages.join("; "));

    let entry = LoadLogEntry {
        table_name: table.to_string(),
        records_processed: progress.processed as i64,
        records_inserted: records_created,
        records_updated,
        records_skipped: progress.skipped as i64,
        records_failed: progress.failed as i64,
        load_start_time: started_at,
        load_end_time: finished_at,
        load_duration_ms: duration_ms,
        load_status: status,
        error_message,
        loaded_by: options.loaded_by.clone(),
        load_type: options.load_type,
    };

    let log_id = match record_load(pool, &entry).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(table, error = %e, "Failed to write run log");
            None
        }
    };

    match &fatal_error {
        Some(e) => error!(table, error = %e, "Load aborted"),
        None => info!(
            table,
            status = status.as_str(),
            processed = progress.processed,
            inserted = progress.inserted,
            failed = progress.failed,
            skipped = progress.skipped,
            duration_ms,
            "Load finished"
        ),
    }

    LoadReport {
        table: table.to_string(),
        status,
        progress,
        records_created,
        records_updated,
        started_at,
        finished_at,
        duration_ms,
        fatal_error,
        log_id,
    }
}
