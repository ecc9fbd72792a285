//! Bootstrap configuration
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (handled by each binary's clap parser, with `env` fallbacks)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error. The loader logs a warning and
//! starts from compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "GOVCON_CONFIG";

/// Longest accepted rate-limit window (31 days)
pub const MAX_RATE_LIMIT_WINDOW_MS: u64 = 31 * 24 * 60 * 60 * 1000;

/// Batch size used for any import table without an override
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory holding the gzip CSV exports
    #[serde(default = "default_import_dir")]
    pub import_dir: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub etl: EtlConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            import_dir: default_import_dir(),
            logging: LoggingConfig::default(),
            etl: EtlConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Loader settings
#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
    /// Field delimiter of the source files (single ASCII character)
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Recorded as `loaded_by` in the run log
    #[serde(default = "default_loaded_by")]
    pub loaded_by: String,

    /// Batch size for tables without an entry in `batch_sizes`
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    /// Per-table batch size overrides, keyed by destination table name
    #[serde(default)]
    pub batch_sizes: HashMap<String, usize>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            loaded_by: default_loaded_by(),
            default_batch_size: default_batch_size(),
            batch_sizes: HashMap::new(),
        }
    }
}

impl EtlConfig {
    /// Batch size for a destination table
    pub fn batch_size_for(&self, table: &str) -> usize {
        self.batch_sizes
            .get(table)
            .copied()
            .unwrap_or(self.default_batch_size)
    }

    /// Delimiter as the byte the CSV reader expects
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(Error::Config(format!(
                "etl.delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )))
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Interval between sweeps of expired rate-limit entries
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_rate_limits")]
    pub rate_limits: Vec<RateLimitPolicy>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            sweep_interval_secs: default_sweep_interval_secs(),
            rate_limits: default_rate_limits(),
        }
    }
}

/// What a rate-limit policy counts requests by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    Ip,
    User,
    Tenant,
    Endpoint,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Ip => "ip",
            RateLimitScope::User => "user",
            RateLimitScope::Tenant => "tenant",
            RateLimitScope::Endpoint => "endpoint",
        }
    }
}

/// One fixed-window policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub name: String,
    pub scope: RateLimitScope,
    /// Requests admitted per window
    pub limit: u32,
    pub window_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("govcon.db")
}

fn default_import_dir() -> PathBuf {
    PathBuf::from("imports")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_loaded_by() -> String {
    "govcon-etl".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    5780
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_rate_limits() -> Vec<RateLimitPolicy> {
    vec![RateLimitPolicy {
        name: "per-ip".to_string(),
        scope: RateLimitScope::Ip,
        limit: 120,
        window_ms: 60_000,
    }]
}

/// Default config file location: `<config dir>/govcon/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("govcon").join("config.toml"))
}

/// Load bootstrap configuration
///
/// An explicit path (argument, then `GOVCON_CONFIG`) must exist. The
/// platform default path may be absent, in which case compiled defaults
/// are returned.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

    let config = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            read_config_file(&path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            Some(path) => {
                warn!(
                    "No config file at {}, using compiled defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("Could not determine config directory, using compiled defaults");
                TomlConfig::default()
            }
        },
    };

    validate(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn validate(config: &TomlConfig) -> Result<()> {
    config.etl.delimiter_byte()?;

    if config.etl.default_batch_size == 0 {
        return Err(Error::Config("etl.default_batch_size must be > 0".to_string()));
    }
    if let Some((table, _)) = config.etl.batch_sizes.iter().find(|(_, size)| **size == 0) {
        return Err(Error::Config(format!(
            "etl.batch_sizes.{} must be > 0",
            table
        )));
    }

    for policy in &config.api.rate_limits {
        if policy.limit == 0 || policy.window_ms == 0 {
            return Err(Error::Config(format!(
                "rate limit policy '{}' needs limit > 0 and window_ms > 0",
                policy.name
            )));
        }
        if policy.window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(Error::Config(format!(
                "rate limit policy '{}' window_ms must be <= {}",
                policy.name, MAX_RATE_LIMIT_WINDOW_MS
            )));
        }
    }

    Ok(())
}

/// Values taken from the command line or environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub import_dir: Option<PathBuf>,
    pub api_port: Option<u16>,
}

impl TomlConfig {
    /// Apply command-line / environment values over the file values
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(path) = overrides.database_path {
            self.database_path = path;
        }
        if let Some(dir) = overrides.import_dir {
            self.import_dir = dir;
        }
        if let Some(port) = overrides.api_port {
            self.api.port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_override_and_fallback() {
        let mut etl = EtlConfig::default();
        etl.batch_sizes.insert("monthly_metrics".to_string(), 250);

        assert_eq!(etl.batch_size_for("monthly_metrics"), 250);
        assert_eq!(etl.batch_size_for("contractor_universe"), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let etl = EtlConfig {
            delimiter: '¦',
            ..EtlConfig::default()
        };
        assert!(etl.delimiter_byte().is_err());
    }

    #[test]
    fn test_zero_limit_policy_rejected() {
        let mut config = TomlConfig::default();
        config.api.rate_limits[0].limit = 0;
        assert!(validate(&config).is_err());
    }
}
