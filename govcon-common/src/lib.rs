//! # GovCon Common Library
//!
//! Shared code for the GovCon services:
//! - Error and result types
//! - Bootstrap configuration (TOML, environment, compiled defaults)
//! - Database initialization and schema
//! - ETL run-log persistence
//! - Read-side record models

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
