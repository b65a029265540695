//! Downstream alerting on threshold crossings.

use serde::{Deserialize, Serialize};
use tally_core::enums::RiskLevel;

/// A record whose score crossed the anomaly threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub record_id: String,
    pub tenant_id: Option<String>,
    pub event_type: String,
    pub anomaly_score: f64,
    pub risk_level: RiskLevel,
    pub category: Option<String>,
}

/// Receives anomaly alerts. Delivery (mail, pager, webhook) is up to the
/// implementation and must not block the worker for long.
pub trait AlertSink: Send + Sync {
    fn anomaly_detected(&self, alert: &AnomalyAlert);
}

/// Default sink: a structured `warn!` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn anomaly_detected(&self, alert: &AnomalyAlert) {
        tracing::warn!(
            record_id = %alert.record_id,
            tenant = alert.tenant_id.as_deref().unwrap_or("<shared>"),
            event_type = %alert.event_type,
            anomaly_score = alert.anomaly_score,
            risk_level = %alert.risk_level,
            "anomaly detected"
        );
    }
}
