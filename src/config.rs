//! Layered configuration for the checker.
//!
//! Loaded with precedence: caller overrides > `CHECKER_`-prefixed
//! environment variables > TOML config file > defaults. Process lifecycle
//! and flag parsing stay outside the crate; callers hand the resulting
//! plain values into the store and pipeline constructors.
//!
//! # Example config file (checker.toml)
//! ```toml
//! [store]
//! path = "/var/lib/checker/users.db"
//!
//! [import]
//! batch_size = 100000
//! users = 100000
//! ```

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Defaults
// =============================================================================

/// Default store file path, relative to the working directory
pub const DEFAULT_STORE_PATH: &str = "checker.db";

/// Default read-cache capacity (user aggregates)
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Default RocksDB write buffer size in MB
pub const DEFAULT_WRITE_BUFFER_MB: usize = 64;

/// Default RocksDB block cache size in MB
pub const DEFAULT_BLOCK_CACHE_MB: usize = 128;

/// Default records per flushed transaction.
/// Amortizes transaction overhead against memory and flush latency.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Default bounded-channel capacity between generator and writer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Default synthetic user count
pub const DEFAULT_USERS: u64 = 100_000;

/// Default cap on distinct IPs per synthetic user
pub const DEFAULT_IPS_PER_USER_MAX: u64 = 10;

/// Default cap on requests per synthetic user
pub const DEFAULT_REQUESTS_PER_USER_MAX: u64 = 1_000;

/// Default mean of the per-user request-count distribution
pub const DEFAULT_REQUESTS_MEAN: f64 = 500.0;

/// Default size of the shared synthetic IP ring.
/// Small enough that distinct users collide on addresses, which is what
/// produces duplicate pairs in generated datasets.
pub const DEFAULT_IP_RING_SIZE: u32 = 500;

/// Default duplicate threshold (shared distinct IPs)
pub const DEFAULT_THRESHOLD: usize = crate::dedup::DEFAULT_DUPLICATE_THRESHOLD;

// =============================================================================
// Config structs
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Embedded store settings
    pub store: StoreConfig,
    /// Ingestion pipeline settings
    pub import: ImportConfig,
    /// Duplicate-detection settings
    pub detect: DetectConfig,
}

impl CheckerConfig {
    /// Load configuration with precedence: overrides > env > file > defaults.
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(CheckerConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // CHECKER_STORE__PATH=... targets store.path; double underscore keeps
        // snake_case keys like batch_size addressable.
        figment = figment.merge(Env::prefixed("CHECKER_").split("__"));
        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }
}

/// Embedded store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store file path
    pub path: PathBuf,
    /// Read-cache capacity (user aggregates)
    pub cache_capacity: usize,
    /// RocksDB write buffer size in MB
    pub write_buffer_mb: usize,
    /// RocksDB block cache size in MB
    pub block_cache_mb: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            write_buffer_mb: DEFAULT_WRITE_BUFFER_MB,
            block_cache_mb: DEFAULT_BLOCK_CACHE_MB,
        }
    }
}

/// Ingestion pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Records per flushed transaction
    pub batch_size: usize,
    /// Bounded-channel capacity between generator and writer
    pub channel_capacity: usize,
    /// Synthetic user count
    pub users: u64,
    /// Cap on distinct IPs per synthetic user
    pub ips_per_user_max: u64,
    /// Cap on requests per synthetic user
    pub requests_per_user_max: u64,
    /// Mean of the per-user request-count distribution
    pub requests_mean: f64,
    /// Size of the shared synthetic IP ring
    pub ip_ring_size: u32,
    /// Generator seed; `None` seeds from entropy at startup
    pub seed: Option<u64>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            users: DEFAULT_USERS,
            ips_per_user_max: DEFAULT_IPS_PER_USER_MAX,
            requests_per_user_max: DEFAULT_REQUESTS_PER_USER_MAX,
            requests_mean: DEFAULT_REQUESTS_MEAN,
            ip_ring_size: DEFAULT_IP_RING_SIZE,
            seed: None,
        }
    }
}

/// Duplicate-detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Shared distinct IPs required to call two accounts duplicates
    pub threshold: usize,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Caller overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detect: Option<DetectOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<usize>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}
