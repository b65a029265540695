//! Anomaly and classification scoring.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use tally_core::entities::AuditRecord;
use tally_core::enums::{RiskLevel, Severity};

use crate::error::EnrichError;

/// Output of a scoring function for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// In `[0, 1]`.
    pub anomaly_score: f64,
    pub category: Option<String>,
    pub risk_level: RiskLevel,
    pub tags: Vec<String>,
}

/// An opaque `(record, embedding) -> classification` function.
pub trait Scorer: Send + Sync {
    /// # Errors
    ///
    /// Returns [`EnrichError::Unavailable`] if the model cannot be reached,
    /// or [`EnrichError::Malformed`] if it cannot score this input.
    fn score(&self, record: &AuditRecord, embedding: &[f32]) -> Result<Classification, EnrichError>;
}

/// Event-type fragments that mark security-sensitive actions.
const SENSITIVE: &[&str] = &[
    "delete", "permission", "role", "grant", "export", "login_failed", "password", "token",
];

/// Rule-based scorer: severity, sensitive actions, off-hours activity, and
/// system-less actors raise the score.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    const fn severity_base(severity: Severity) -> f64 {
        match severity {
            Severity::Info => 0.05,
            Severity::Warning => 0.3,
            Severity::Error => 0.55,
            Severity::Critical => 0.8,
        }
    }

    /// Leading word of the event type: `permission_changed` -> `permission`.
    fn category(event_type: &str) -> Option<String> {
        event_type
            .split(|c: char| matches!(c, '_' | '.' | ':'))
            .find(|part| !part.is_empty())
            .map(str::to_lowercase)
    }
}

impl Scorer for HeuristicScorer {
    fn score(&self, record: &AuditRecord, _embedding: &[f32]) -> Result<Classification, EnrichError> {
        let mut score = Self::severity_base(record.severity);
        let mut tags = Vec::new();

        let event = record.event_type.to_lowercase();
        if SENSITIVE.iter().any(|s| event.contains(s)) {
            score += 0.15;
            tags.push("sensitive_action".to_string());
        }
        let hour = record.occurred_at.hour();
        if !(6..20).contains(&hour) {
            score += 0.1;
            tags.push("after_hours".to_string());
        }
        if record.actor_id.is_none() && record.tenant_id.is_some() {
            score += 0.05;
            tags.push("no_actor".to_string());
        }

        let anomaly_score = score.clamp(0.0, 1.0);
        Ok(Classification {
            anomaly_score,
            category: Self::category(&record.event_type),
            risk_level: RiskLevel::from_score(anomaly_score),
            tags,
        })
    }
}
