//! HTTP API handlers for govcon-api

pub mod contractors;
pub mod health;
pub mod load_logs;

pub use contractors::{get_contractor_iceberg, get_contractor_profile, get_profile};
pub use health::health_routes;
pub use load_logs::list_load_logs;
