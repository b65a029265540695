//! Export grant configuration.

use serde::{Deserialize, Serialize};

const fn default_ttl_secs() -> u64 {
    86_400
}

const fn default_max_ttl_secs() -> u64 {
    604_800
}

const fn default_artifact_max_records() -> u32 {
    50_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Grant lifetime when the request does not specify one.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Longest lifetime a request may ask for.
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,

    /// Download limit when the request does not specify one. `None` = unlimited.
    #[serde(default)]
    pub default_download_limit: Option<u32>,

    /// Most records a single artifact may contain.
    #[serde(default = "default_artifact_max_records")]
    pub artifact_max_records: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            max_ttl_secs: default_max_ttl_secs(),
            default_download_limit: None,
            artifact_max_records: default_artifact_max_records(),
        }
    }
}
