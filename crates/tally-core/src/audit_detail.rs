//! Typed `action_details` payloads for records the trail writes about itself.
//!
//! Caller-supplied records carry arbitrary JSON objects; these types cover the
//! events the store, bulk path, and enrichment pipeline append on their own.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `event_type` of the summary record written after a bulk import.
pub const EVENT_BULK_IMPORT: &str = "bulk_import";

/// `event_type` of the per-row record written by the entity audit hook.
pub const EVENT_ENTITY_UPSERTED: &str = "entity_upserted";

/// `event_type` of the record written when a reviewer clears an anomaly.
pub const EVENT_ANOMALY_REVIEWED: &str = "anomaly_reviewed";

/// `event_type` of the record written when enrichment is explicitly regenerated.
pub const EVENT_ENRICHMENT_REGENERATED: &str = "enrichment_regenerated";

/// `entity_type` used for records about the audit trail itself.
pub const ENTITY_AUDIT_RECORD: &str = "audit_record";

/// Detail for [`EVENT_BULK_IMPORT`].
///
/// One summary replaces per-row records for the whole import, so
/// `per_row_detail` is always `false`: the individual rows are not auditable
/// from the trail.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct BulkImportDetail {
    pub entity_kind: String,
    pub row_count: u64,
    pub per_row_detail: bool,
}

/// Detail for [`EVENT_ENTITY_UPSERTED`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EntityUpsertDetail {
    pub entity_kind: String,
    pub created: bool,
    pub payload: serde_json::Value,
}

/// Detail for [`EVENT_ANOMALY_REVIEWED`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AnomalyReviewDetail {
    pub reviewed_record_id: String,
    pub anomaly_score: Option<f64>,
    pub verdict: String,
    pub note: Option<String>,
}

/// Detail for [`EVENT_ENRICHMENT_REGENERATED`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RegenerateDetail {
    pub target_record_id: String,
    pub reason: Option<String>,
}
