use std::path::Path;

use anyhow::Context;
use tally_config::TallyConfig;

use crate::cli::GlobalFlags;

/// Load configuration from dotenv, TOML files, and `TALLY_*` variables, then
/// apply command-line overrides.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<TallyConfig> {
    if let Some(env_file) = &flags.env_file {
        let path = Path::new(env_file);
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load dotenv file at {}", path.display()))?;
    }

    let mut config = TallyConfig::load_with_dotenv().context("failed to load tally configuration")?;
    if let Some(database) = &flags.database {
        config.database.path.clone_from(database);
    }
    config.validate().context("invalid tally configuration")?;

    tracing::debug!(database = %config.database.path, "configuration loaded");
    Ok(config)
}
