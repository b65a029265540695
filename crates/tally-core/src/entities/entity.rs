use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A row in the tracked business-entity collection.
///
/// Writes to this collection are audited per row unless the audit hook for
/// its `entity_kind` is suspended by a bulk import.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TrackedEntity {
    pub tenant_id: Option<String>,
    pub entity_kind: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// One input row of a bulk import (one JSONL line).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EntityRow {
    pub entity_id: String,
    /// Must match the caller's tenant when present.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}
