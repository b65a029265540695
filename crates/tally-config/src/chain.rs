//! Hash-chain append retry configuration.

use serde::{Deserialize, Serialize};

const fn default_max_append_attempts() -> u32 {
    5
}

const fn default_retry_base_delay_ms() -> u64 {
    10
}

const fn default_retry_max_delay_ms() -> u64 {
    500
}

/// Backoff for appends that lose the race for a chain tail.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Attempts (including the first) before giving up with an integrity violation.
    #[serde(default = "default_max_append_attempts")]
    pub max_append_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_append_attempts: default_max_append_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}
