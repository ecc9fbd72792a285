//! ETL jobs
//!
//! Tables load one after another. A table that fails fatally gets a
//! `failed` run log and the job moves on to the next one.

use crate::error::{LoadError, LoadResult};
use crate::iceberg::{rebuild_iceberg, ICEBERG_BATCH_SIZE};
use crate::loader::{finish_load, load_table, LoadOptions, LoadProgress, LoadReport};
use crate::profiles::{rebuild_profiles, ProfileRebuildSummary};
use crate::tables::{import_table, TableSpec, ICEBERG_OPPORTUNITIES, IMPORT_TABLES};
use chrono::Utc;
use govcon_common::config::TomlConfig;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Results of a full `run`
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub imports: Vec<LoadReport>,
    pub iceberg: LoadReport,
    pub profiles: ProfileRebuildSummary,
}

/// Source shards for a table: `<file_stem>*.csv.gz` directly in `import_dir`, sorted
pub fn discover_sources(import_dir: &Path, spec: &TableSpec) -> LoadResult<Vec<PathBuf>> {
    let no_files = || LoadError::NoSourceFiles {
        table: spec.table.to_string(),
        pattern: format!("{}*.csv.gz", spec.file_stem),
        dir: import_dir.display().to_string(),
    };

    if !import_dir.is_dir() {
        return Err(no_files());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(import_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %import_dir.display(), error = %e, "Error accessing import entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(spec.file_stem) && name.ends_with(".csv.gz") {
            paths.push(entry.into_path());
        }
    }

    if paths.is_empty() {
        return Err(no_files());
    }
    paths.sort();
    Ok(paths)
}

/// Resolve table names to import specs; empty means all, in load order
pub fn select_tables(names: &[String]) -> LoadResult<Vec<&'static TableSpec>> {
    if names.is_empty() {
        return Ok(IMPORT_TABLES.to_vec());
    }

    names
        .iter()
        .map(|name| import_table(name).ok_or_else(|| LoadError::UnknownTable(name.clone())))
        .collect()
}

/// Load each table from the import directory
///
/// Every table gets a run-log record. A table that cannot start (bad
/// options, no source files) is logged as failed and the next one runs.
pub async fn run_imports(
    pool: &SqlitePool,
    config: &TomlConfig,
    tables: &[&'static TableSpec],
) -> Vec<LoadReport> {
    let mut reports = Vec::with_capacity(tables.len());

    for spec in tables {
        let (options, sources) = match LoadOptions::for_import(&config.etl, spec) {
            Ok(options) => {
                let sources = discover_sources(&config.import_dir, spec);
                (options, sources)
            }
            Err(e) => (LoadOptions::unresolved_import(&config.etl, spec), Err(e)),
        };

        let report = match sources {
            Ok(paths) => load_table(pool, spec, &paths, &options).await,
            Err(e) => {
                finish_load(
                    pool,
                    spec.table,
                    &options,
                    Utc::now(),
                    Instant::now(),
                    LoadProgress::default(),
                    0,
                    Some(e),
                )
                .await
            }
        };
        reports.push(report);
    }

    reports
}

pub async fn run_iceberg(pool: &SqlitePool, config: &TomlConfig) -> LoadReport {
    let batch_size = config
        .etl
        .batch_sizes
        .get(ICEBERG_OPPORTUNITIES.table)
        .copied()
        .unwrap_or(ICEBERG_BATCH_SIZE);
    let options = LoadOptions::for_aggregation(&config.etl, batch_size);
    rebuild_iceberg(pool, &options).await
}

pub async fn run_profiles(pool: &SqlitePool, config: &TomlConfig) -> ProfileRebuildSummary {
    let options = LoadOptions::for_aggregation(&config.etl, config.etl.default_batch_size);
    rebuild_profiles(pool, &options).await
}

/// Imports, then the iceberg pass, then the profile rebuild
pub async fn run_all(pool: &SqlitePool, config: &TomlConfig) -> JobSummary {
    let started = Instant::now();
    let imports = run_imports(pool, config, &IMPORT_TABLES).await;
    let iceberg = run_iceberg(pool, config).await;
    let profiles = run_profiles(pool, config).await;

    info!(
        tables = imports.len(),
        failed_tables = imports.iter().filter(|r| r.fatal_error.is_some()).count(),
        profiles = profiles.profiles_created,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "ETL run complete"
    );

    JobSummary {
        imports,
        iceberg,
        profiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{CONTRACTOR_UNIVERSE, MONTHLY_METRICS};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_sources_matches_shards_sorted() {
        let dir = TempDir::new().unwrap();
        for name in [
            "monthly_metrics_0002.csv.gz",
            "monthly_metrics_0001.csv.gz",
            "monthly_metrics.csv",
            "contractor_universe.csv.gz",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("monthly_metrics_nested.csv.gz")).unwrap();

        let paths = discover_sources(dir.path(), &MONTHLY_METRICS).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["monthly_metrics_0001.csv.gz", "monthly_metrics_0002.csv.gz"]);
    }

    #[test]
    fn test_discover_sources_none_is_error() {
        let dir = TempDir::new().unwrap();
        let result = discover_sources(dir.path(), &CONTRACTOR_UNIVERSE);
        assert!(matches!(result, Err(LoadError::NoSourceFiles { .. })));

        let missing = dir.path().join("nope");
        assert!(discover_sources(&missing, &CONTRACTOR_UNIVERSE).is_err());
    }

    #[test]
    fn test_select_tables() {
        assert_eq!(select_tables(&[]).unwrap().len(), IMPORT_TABLES.len());

        let picked = select_tables(&["peer_comparisons".to_string()]).unwrap();
        assert_eq!(picked[0].table, "peer_comparisons");

        assert!(matches!(
            select_tables(&["bogus".to_string()]),
            Err(LoadError::UnknownTable(_))
        ));
    }
}
