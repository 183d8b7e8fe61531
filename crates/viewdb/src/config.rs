//! Module: config
//! Responsibility: TOML runtime configuration for the facade.
//! Does not own: per-entity view tables, which are code, not configuration.

use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error as ThisError;
use viewdb_core::db::{
    cache::DEFAULT_CACHE_CAPACITY,
    design::{DEFAULT_DESIGN_ATTEMPTS, SyncOptions},
    stream::DEFAULT_SCAN_BATCH_SIZE,
};

/// Page size used when a caller does not pass one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io { path: String, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

///
/// ViewDbConfig
///
/// Every section and field is optional; missing values take their defaults.
///
/// ```toml
/// [cache]
/// enabled = true
/// capacity = 10000
///
/// [query]
/// scan_batch_size = 1000
/// default_page_size = 50
///
/// [design]
/// max_attempts = 3
/// update_if_exists = true
/// prune = false
/// ```
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewDbConfig {
    pub cache: CacheConfig,
    pub query: QueryConfig,
    pub design: DesignConfig,
}

impl ViewDbConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be greater than zero when the cache is enabled".to_string(),
            ));
        }
        if self.query.scan_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "query.scan_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.query.default_page_size == 0 {
            return Err(ConfigError::Invalid(
                "query.default_page_size must be greater than zero".to_string(),
            ));
        }
        if self.design.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "design.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

///
/// CacheConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

///
/// QueryConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    pub scan_batch_size: usize,
    pub default_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

///
/// DesignConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesignConfig {
    pub max_attempts: u32,
    pub update_if_exists: bool,
    pub prune: bool,
}

impl DesignConfig {
    #[must_use]
    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            update_if_exists: self.update_if_exists,
            prune: self.prune,
            dry_run: false,
        }
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_DESIGN_ATTEMPTS,
            update_if_exists: true,
            prune: false,
        }
    }
}

///
/// TESTS
///
