//! # tally-config
//!
//! Layered configuration loading for tally using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`TALLY_*` prefix, `__` as separator)
//! 2. Project-level `.tally/config.toml`
//! 3. User-level `~/.config/tally/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `TALLY_DATABASE__PATH` -> `database.path`,
//! `TALLY_INGEST__DELIMITER` -> `ingest.delimiter`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use tally_config::TallyConfig;
//!
//! let config = TallyConfig::load_with_dotenv().expect("config");
//! println!("database: {}", config.database.path);
//! ```

mod audit;
mod database;
mod error;
mod ingest;

pub use audit::AuditConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use ingest::IngestConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tally_core::Ident;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl TallyConfig {
    /// Load configuration from all sources (TOML files + environment variables)
    /// and validate it.
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` loading.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support from the current directory.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests and the CLI can layer additional providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".tally/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("TALLY_").split("__"))
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.delimiter_byte().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "ingest.delimiter".into(),
                reason: format!("{:?} is not a single ASCII character", self.ingest.delimiter),
            });
        }
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ingest.batch_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        if let Err(e) = Ident::new(self.database.schema.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "database.schema".into(),
                reason: e.to_string(),
            });
        }
        if let Err(e) = Ident::new(self.ingest.staging_prefix.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "ingest.staging_prefix".into(),
                reason: e.to_string(),
            });
        }
        if self.ingest.staging_prefix.to_ascii_lowercase().starts_with("_tally_") {
            return Err(ConfigError::InvalidValue {
                field: "ingest.staging_prefix".into(),
                reason: "the _tally_ prefix is reserved for change-capture tables".into(),
            });
        }
        if let Err(e) = Ident::new(format!("t{}", self.audit.table_suffix)) {
            return Err(ConfigError::InvalidValue {
                field: "audit.table_suffix".into(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tally").join("config.toml"))
    }
}
