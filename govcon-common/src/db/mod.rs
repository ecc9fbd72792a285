//! Database initialization, run log and read-side models

pub mod init;
pub mod load_log;
pub mod models;

pub use init::*;
pub use load_log::*;
pub use models::*;
