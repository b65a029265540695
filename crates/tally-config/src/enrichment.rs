//! Enrichment pipeline configuration.

use serde::{Deserialize, Serialize};

const fn default_batch_size() -> u32 {
    64
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_workers() -> usize {
    4
}

const fn default_anomaly_threshold() -> f64 {
    0.8
}

const fn default_call_timeout_ms() -> u64 {
    10_000
}

const fn default_retry_base_delay_secs() -> u64 {
    30
}

const fn default_retry_max_delay_secs() -> u64 {
    3_600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    /// Records discovered per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Bound of the job queue between discovery and workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Concurrent enrichment workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Scores strictly above this mark the record as an anomaly.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Upper bound on a single embedding or scoring call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Delay before a failed record is offered again (doubles per failure).
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            anomaly_threshold: default_anomaly_threshold(),
            call_timeout_ms: default_call_timeout_ms(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
        }
    }
}
