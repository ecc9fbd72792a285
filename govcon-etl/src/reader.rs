//! Gzip CSV source reader
//!
//! Decoding runs on a blocking thread and feeds the loader through a
//! bounded channel. While the loader is flushing a batch the channel fills
//! and the reader blocks on send, so at most one batch plus the channel
//! capacity is buffered.

use crate::error::{LoadError, LoadResult};
use crate::tables::TableSpec;
use crate::writer::RowValues;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// One decoded source row
#[derive(Debug)]
pub enum ReadEvent {
    /// Values in `TableSpec::columns` order
    Row(RowValues),
    /// Row without a usable natural key, or undecodable; carries the reason
    Skipped(String),
}

pub type ReadItem = LoadResult<ReadEvent>;

/// Start decoding `file` on a blocking thread
///
/// The receiver yields rows until end of stream. A fatal error arrives as
/// the last item.
pub fn spawn_reader(
    file: File,
    spec: &'static TableSpec,
    delimiter: u8,
    capacity: usize,
) -> (mpsc::Receiver<ReadItem>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::task::spawn_blocking(move || {
        let gz = MultiGzDecoder::new(BufReader::new(file));
        if let Err(e) = read_source(gz, spec, delimiter, &tx) {
            // Receiver may already be gone; nothing left to report to
            let _ = tx.blocking_send(Err(e));
        }
    });

    (rx, handle)
}

/// Decode delimited text from `source` and send one event per record
pub fn read_source<R: Read>(
    source: R,
    spec: &'static TableSpec,
    delimiter: u8,
    tx: &mpsc::Sender<ReadItem>,
) -> LoadResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let positions = resolve_columns(spec, &headers)?;

    let mut record = csv::StringRecord::new();
    loop {
        let event = match reader.read_record(&mut record) {
            Ok(true) => transform_record(spec, &positions, &record),
            Ok(false) => break,
            Err(e) => match e.kind() {
                csv::ErrorKind::Utf8 { .. } => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    ReadEvent::Skipped(format!("line {}: {}", line, e))
                }
                _ => return Err(e.into()),
            },
        };

        if tx.blocking_send(Ok(event)).is_err() {
            debug!(table = spec.table, "Loader stopped receiving, ending read");
            return Ok(());
        }
    }

    Ok(())
}

/// Position of each mapped column in the file, matched case-insensitively
///
/// A missing key column is fatal. Any other missing column reads as absent,
/// so every row gets that column's default.
pub fn resolve_columns(
    spec: &TableSpec,
    headers: &csv::StringRecord,
) -> LoadResult<Vec<Option<usize>>> {
    let mut positions = Vec::with_capacity(spec.columns.len());

    for column in spec.columns {
        let position = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column.source));

        if position.is_none() {
            if column.kind.is_key() {
                return Err(LoadError::MissingKeyColumn {
                    table: spec.table.to_string(),
                    column: column.source.to_string(),
                });
            }
            debug!(
                table = spec.table,
                column = column.source,
                "Column absent from source, using default"
            );
        }
        positions.push(position);
    }

    Ok(positions)
}

/// Apply the table mapping to one record
pub fn transform_record(
    spec: &TableSpec,
    positions: &[Option<usize>],
    record: &csv::StringRecord,
) -> ReadEvent {
    let mut values = Vec::with_capacity(spec.columns.len());

    for (column, position) in spec.columns.iter().zip(positions) {
        let raw = position.and_then(|i| record.get(i));
        match column.kind.convert(raw) {
            Some(value) => values.push(value),
            None => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return ReadEvent::Skipped(format!(
                    "line {}: no usable {} value",
                    line, column.source
                ));
            }
        }
    }

    ReadEvent::Row(values)
}
