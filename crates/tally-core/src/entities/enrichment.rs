use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{EnrichmentState, ReviewStatus, RiskLevel};

/// Derived annotations attached to a record by the enrichment pipeline.
///
/// Lives in its own side-table keyed by record ID and is never part of the
/// record's content or chain hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub embedded_at: Option<DateTime<Utc>>,
    pub anomaly_score: Option<f64>,
    pub is_anomaly: Option<bool>,
    pub category: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub tags: Option<Vec<String>>,
    pub scored_at: Option<DateTime<Utc>>,
    pub review_status: Option<ReviewStatus>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Failed enrichment attempts since the last success or regenerate.
    #[serde(default)]
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Enrichment {
    /// Lifecycle position derived from which fields are set.
    #[must_use]
    pub const fn state(&self) -> EnrichmentState {
        if self.review_status.is_some() {
            EnrichmentState::Reviewed
        } else if self.scored_at.is_some() {
            EnrichmentState::Scored
        } else if self.embedded_at.is_some() {
            EnrichmentState::Embedded
        } else {
            EnrichmentState::Unenriched
        }
    }

    /// Whether an attempt was made and failed before scores were stored.
    #[must_use]
    pub const fn is_failing(&self) -> bool {
        self.attempts > 0 && self.scored_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unenriched() {
        let e = Enrichment::default();
        assert_eq!(e.state(), EnrichmentState::Unenriched);
        assert!(!e.is_failing());
    }

    #[test]
    fn state_follows_fields() {
        let now = Utc::now();
        let mut e = Enrichment {
            embedding: Some(vec![0.0; 4]),
            embedded_at: Some(now),
            ..Enrichment::default()
        };
        assert_eq!(e.state(), EnrichmentState::Embedded);
        e.scored_at = Some(now);
        assert_eq!(e.state(), EnrichmentState::Scored);
        e.review_status = Some(ReviewStatus::FalsePositive);
        assert_eq!(e.state(), EnrichmentState::Reviewed);
    }

    #[test]
    fn failed_attempt_is_distinguishable() {
        let e = Enrichment {
            attempts: 2,
            last_error: Some("timeout".into()),
            ..Enrichment::default()
        };
        assert_eq!(e.state(), EnrichmentState::Unenriched);
        assert!(e.is_failing());
    }
}
