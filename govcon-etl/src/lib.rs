//! # GovCon ETL
//!
//! Batch loader for analytics exports:
//! - Streams gzip-compressed delimited shards into SQLite with batched upserts
//! - Records one run log per table load or aggregation pass
//! - Rebuilds derived tables (iceberg opportunities, contractor profiles)

pub mod error;
pub mod fields;
pub mod iceberg;
pub mod jobs;
pub mod loader;
pub mod metrics;
pub mod profiles;
pub mod reader;
pub mod tables;
pub mod writer;

pub use error::{LoadError, LoadResult};
pub use jobs::{run_all, run_iceberg, run_imports, run_profiles, JobSummary};
pub use loader::{load_table, LoadOptions, LoadProgress, LoadReport};
pub use profiles::ProfileRebuildSummary;
