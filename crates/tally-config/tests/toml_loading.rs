//! Integration tests for TOML configuration loading.
//!
//! Uses `figment::Jail` for sandboxed file and env var manipulation.

use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;
use tally_config::TallyConfig;

#[test]
fn loads_sections_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[database]
path = "/var/lib/tally/trail.db"
busy_timeout_ms = 250

[enrichment]
workers = 8
anomaly_threshold = 0.65

[export]
default_download_limit = 3
"#,
        )?;

        let config: TallyConfig = Figment::from(Serialized::defaults(TallyConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.database.path, "/var/lib/tally/trail.db");
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.enrichment.workers, 8);
        assert!((config.enrichment.anomaly_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(config.export.default_download_limit, Some(3));
        // untouched fields keep their defaults
        assert_eq!(config.enrichment.queue_capacity, 256);
        assert_eq!(config.chain.max_append_attempts, 5);
        Ok(())
    });
}

#[test]
fn project_file_is_picked_up_by_figment() {
    Jail::expect_with(|jail| {
        jail.create_dir(".tally")?;
        jail.create_file(
            ".tally/config.toml",
            r"
[general]
default_limit = 7
",
        )?;

        let config = TallyConfig::load().map_err(|e| e.to_string())?;
        assert_eq!(config.general.default_limit, 7);
        Ok(())
    });
}

#[test]
fn env_overrides_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r"
[chain]
max_append_attempts = 3
",
        )?;
        jail.set_env("TALLY_CHAIN__MAX_APPEND_ATTEMPTS", "9");
        jail.set_env("TALLY_ENRICHMENT__BATCH_SIZE", "16");

        let config: TallyConfig = Figment::from(Serialized::defaults(TallyConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("TALLY_").split("__"))
            .extract()?;

        assert_eq!(config.chain.max_append_attempts, 9);
        assert_eq!(config.enrichment.batch_size, 16);
        Ok(())
    });
}

#[test]
fn wrong_type_is_an_error() {
    Jail::expect_with(|jail| {
        jail.set_env("TALLY_ENRICHMENT__WORKERS", "many");
        let result = TallyConfig::load();
        assert!(result.is_err());
        Ok(())
    });
}
