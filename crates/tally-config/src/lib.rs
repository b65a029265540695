//! # tally-config
//!
//! Layered configuration loading for Tally using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`TALLY_*` prefix, `__` as separator)
//! 2. Project-level `.tally/config.toml`
//! 3. User-level `~/.config/tally/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `TALLY_ENRICHMENT__WORKERS` -> `enrichment.workers`,
//! `TALLY_DATABASE__PATH` -> `database.path`, etc.
//!
//! ```no_run
//! use tally_config::TallyConfig;
//!
//! let config = TallyConfig::load_with_dotenv().expect("config");
//! config.validate().expect("valid config");
//! println!("database: {}", config.database.path);
//! ```

mod chain;
mod database;
mod enrichment;
mod error;
mod export;
mod general;

pub use chain::ChainConfig;
pub use database::DatabaseConfig;
pub use enrichment::EnrichmentConfig;
pub use error::ConfigError;
pub use export::ExportConfig;
pub use general::GeneralConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl TallyConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env` loading.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Figment`] if a source fails to parse or a value
    /// has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can add providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path().filter(|p| p.exists()) {
            figment = figment.merge(Toml::file(global_path));
        }

        let local_path = PathBuf::from(".tally/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("TALLY_").split("__"))
    }

    /// Reject values that would make the engine misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.enrichment.anomaly_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "enrichment.anomaly_threshold",
                format!("{threshold} is outside [0, 1]"),
            ));
        }
        if self.enrichment.workers == 0 {
            return Err(invalid("enrichment.workers", "must be at least 1"));
        }
        if self.enrichment.queue_capacity == 0 {
            return Err(invalid("enrichment.queue_capacity", "must be at least 1"));
        }
        if self.enrichment.batch_size == 0 {
            return Err(invalid("enrichment.batch_size", "must be at least 1"));
        }
        if self.chain.max_append_attempts == 0 {
            return Err(invalid("chain.max_append_attempts", "must be at least 1"));
        }
        if self.export.default_ttl_secs > self.export.max_ttl_secs {
            return Err(invalid(
                "export.default_ttl_secs",
                format!("exceeds export.max_ttl_secs ({})", self.export.max_ttl_secs),
            ));
        }
        Ok(())
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tally").join("config.toml"))
    }

    /// Walks up from `CARGO_MANIFEST_DIR` (if set) looking for `.env`, then
    /// falls back to the current directory. Missing files are ignored.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }
        let _ = dotenvy::dotenv();
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TallyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain.max_append_attempts, 5);
    }

    #[test]
    fn figment_builds_without_files() {
        let config: TallyConfig = TallyConfig::figment()
            .extract()
            .expect("should extract defaults");
        assert_eq!(config.general.default_limit, 100);
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let mut config = TallyConfig::default();
        config.enrichment.anomaly_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("enrichment.anomaly_threshold"));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = TallyConfig::default();
        config.enrichment.workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "enrichment.workers"
        ));
    }

    #[test]
    fn ttl_above_max_rejected() {
        let mut config = TallyConfig::default();
        config.export.default_ttl_secs = config.export.max_ttl_secs + 1;
        assert!(config.validate().is_err());
    }
}
