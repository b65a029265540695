use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::chain::{canonicalize_json, format_timestamp, sha256_hex};
use crate::enums::{AccessAction, AccessOutcome};

/// Meta-audit entry: someone read, searched, verified, or exported the trail.
///
/// Append-only. Each entry carries its own content digest (`entry_hash`)
/// but entries are not chained to each other.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub id: String,
    pub tenant_id: Option<String>,
    pub actor_id: String,
    pub action: AccessAction,
    /// Record ID, export token, or query description.
    pub target: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub outcome: AccessOutcome,
    pub is_security_event: bool,
    pub entry_hash: String,
    pub occurred_at: DateTime<Utc>,
}

impl AccessLogEntry {
    /// Digest over every field except `entry_hash`.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let canonical = serde_json::json!({
            "id": self.id,
            "tenant_id": self.tenant_id,
            "actor_id": self.actor_id,
            "action": self.action.as_str(),
            "target": self.target,
            "detail": self.detail.as_ref().map(canonicalize_json),
            "outcome": self.outcome.as_str(),
            "is_security_event": self.is_security_event,
            "occurred_at": format_timestamp(&self.occurred_at),
        });
        sha256_hex(canonicalize_json(&canonical).to_string().as_bytes())
    }

    /// Whether the stored digest still matches the entry.
    #[must_use]
    pub fn is_untampered(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }
}
