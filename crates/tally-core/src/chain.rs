//! Canonical serialization and the per-tenant hash chain.
//!
//! Every audit record carries two digests:
//! - `content_hash`: `SHA-256` over the canonical JSON of the record's audited
//!   fields (id, tenant, event/entity identity, details, severity, actor, time).
//! - `chain_hash`: `SHA-256` over `prev_chain_hash || content_hash`, where the
//!   first record of a chain links to [`GENESIS_HASH`].
//!
//! Enrichment fields never take part in either digest.
//!
//! Canonical JSON sorts object keys recursively, so the same logical payload
//! always hashes the same regardless of how it was built. Timestamps are
//! rendered as RFC 3339 UTC with microsecond precision, which is also the
//! stored representation, so a value read back from storage re-hashes exactly.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::AuditRecord;
use crate::enums::Severity;
use crate::errors::CoreError;

/// Predecessor hash of the first record in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Render a timestamp in the canonical stored form.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop sub-microsecond precision so a timestamp survives a storage roundtrip.
#[must_use]
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = ts.nanosecond();
    ts.with_nanosecond(nanos - nanos % 1_000).unwrap_or(ts)
}

/// Rebuild a JSON value with every object's keys in sorted order.
#[must_use]
pub fn canonicalize_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize_json(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize_json).collect())
        }
        other => other.clone(),
    }
}

/// Serialize a JSON value canonically.
///
/// # Errors
///
/// Returns [`CoreError::Canonical`] if serialization fails.
pub fn canonical_json_string(value: &serde_json::Value) -> Result<String, CoreError> {
    serde_json::to_string(&canonicalize_json(value)).map_err(|e| CoreError::Canonical(e.to_string()))
}

/// The audited fields of a record, in hashing order.
#[derive(Debug, Serialize)]
pub struct CanonicalContent<'a> {
    pub id: &'a str,
    pub tenant_id: Option<&'a str>,
    pub event_type: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub action_details: serde_json::Value,
    pub severity: Severity,
    pub actor_id: Option<&'a str>,
    pub occurred_at: String,
}

impl<'a> CanonicalContent<'a> {
    /// Borrow the audited fields of a stored record.
    #[must_use]
    pub fn of(record: &'a AuditRecord) -> Self {
        Self {
            id: &record.id,
            tenant_id: record.tenant_id.as_deref(),
            event_type: &record.event_type,
            entity_type: &record.entity_type,
            entity_id: &record.entity_id,
            action_details: canonicalize_json(&record.action_details),
            severity: record.severity,
            actor_id: record.actor_id.as_deref(),
            occurred_at: format_timestamp(&record.occurred_at),
        }
    }

    /// Canonical bytes fed to the content digest.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Canonical`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Canonical(e.to_string()))
    }

    /// Hex `SHA-256` of the canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Canonical`] if serialization fails.
    pub fn digest(&self) -> Result<String, CoreError> {
        Ok(sha256_hex(&self.to_bytes()?))
    }
}

/// Hex `SHA-256` of arbitrary bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Content digest of a record's audited fields.
///
/// # Errors
///
/// Returns [`CoreError::Canonical`] if serialization fails.
pub fn content_hash(record: &AuditRecord) -> Result<String, CoreError> {
    CanonicalContent::of(record).digest()
}

/// Link a content digest to its predecessor's chain hash.
#[must_use]
pub fn chain_hash(prev_chain_hash: &str, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_chain_hash.as_bytes());
    hasher.update(content_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// What kind of break verification found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Stored `content_hash` does not match the recomputed digest (fields altered).
    ContentMismatch,
    /// Stored `prev_hash` does not point at the preceding record (reordered or spliced).
    BrokenLink,
    /// Stored `chain_hash` does not match the recomputed link.
    ChainMismatch,
    /// Sequence numbers are not contiguous (record removed or inserted).
    SequenceGap,
}

/// The first point where a chain diverges from its recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Divergence {
    /// 1-based position within the tenant chain.
    pub seq: i64,
    pub record_id: String,
    pub kind: DivergenceKind,
    pub expected: String,
    pub actual: String,
}

/// Outcome of verifying a range of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerificationResult {
    /// Tenant whose chain was checked. `None` for the shared baseline chain.
    pub tenant_id: Option<String>,
    pub from_seq: i64,
    pub to_seq: i64,
    pub records_checked: u64,
    pub divergence: Option<Divergence>,
}

impl VerificationResult {
    #[must_use]
    pub const fn is_intact(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Walk records in sequence order and report the first divergence.
///
/// `start_prev` is the stored chain hash of the record preceding the range
/// (or [`GENESIS_HASH`] when the range starts at 1). The walk carries the
/// *recomputed* link forward, so an alteration is reported at the record
/// where it happened and never later.
///
/// # Errors
///
/// Returns [`CoreError::Canonical`] if a record cannot be serialized.
pub fn verify_sequence<'a, I>(
    start_seq: i64,
    start_prev: &str,
    records: I,
) -> Result<(u64, Option<Divergence>), CoreError>
where
    I: IntoIterator<Item = &'a AuditRecord>,
{
    let mut expected_seq = start_seq;
    let mut prev = start_prev.to_string();
    let mut checked = 0u64;

    for record in records {
        checked += 1;

        if record.seq != expected_seq {
            return Ok((
                checked,
                Some(Divergence {
                    seq: record.seq,
                    record_id: record.id.clone(),
                    kind: DivergenceKind::SequenceGap,
                    expected: expected_seq.to_string(),
                    actual: record.seq.to_string(),
                }),
            ));
        }

        let recomputed_content = content_hash(record)?;
        if recomputed_content != record.content_hash {
            return Ok((
                checked,
                Some(Divergence {
                    seq: record.seq,
                    record_id: record.id.clone(),
                    kind: DivergenceKind::ContentMismatch,
                    expected: recomputed_content,
                    actual: record.content_hash.clone(),
                }),
            ));
        }

        if record.prev_hash != prev {
            return Ok((
                checked,
                Some(Divergence {
                    seq: record.seq,
                    record_id: record.id.clone(),
                    kind: DivergenceKind::BrokenLink,
                    expected: prev,
                    actual: record.prev_hash.clone(),
                }),
            ));
        }

        let recomputed_chain = chain_hash(&prev, &recomputed_content);
        if recomputed_chain != record.chain_hash {
            return Ok((
                checked,
                Some(Divergence {
                    seq: record.seq,
                    record_id: record.id.clone(),
                    kind: DivergenceKind::ChainMismatch,
                    expected: recomputed_chain,
                    actual: record.chain_hash.clone(),
                }),
            ));
        }

        prev = recomputed_chain;
        expected_seq += 1;
    }

    Ok((checked, None))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn record(seq: i64, prev: &str, details: serde_json::Value) -> AuditRecord {
        let mut r = AuditRecord {
            id: format!("evt-{seq:016x}"),
            tenant_id: Some("acme".to_string()),
            seq,
            event_type: "project_updated".to_string(),
            entity_type: "project".to_string(),
            entity_id: "prj-1".to_string(),
            action_details: details,
            severity: Severity::Info,
            actor_id: Some("u-1".to_string()),
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            content_hash: String::new(),
            prev_hash: prev.to_string(),
            chain_hash: String::new(),
            enrichment: None,
        };
        r.content_hash = content_hash(&r).unwrap();
        r.chain_hash = chain_hash(prev, &r.content_hash);
        r
    }

    fn chain_of(n: i64) -> Vec<AuditRecord> {
        let mut out: Vec<AuditRecord> = Vec::new();
        let mut prev = GENESIS_HASH.to_string();
        for seq in 1..=n {
            let r = record(seq, &prev, json!({"n": seq}));
            prev = r.chain_hash.clone();
            out.push(r);
        }
        out
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"z": true, "y": [ {"d": 1, "c": 2} ]}});
        let s = canonical_json_string(&a).unwrap();
        assert_eq!(s, r#"{"a":{"y":[{"c":2,"d":1}],"z":true},"b":1}"#);
    }

    #[test]
    fn content_hash_ignores_key_order() {
        let a = record(1, GENESIS_HASH, json!({"old": 1, "new": 2}));
        let b = record(1, GENESIS_HASH, json!({"new": 2, "old": 1}));
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn content_hash_ignores_enrichment() {
        let a = record(1, GENESIS_HASH, json!({}));
        let mut b = a.clone();
        b.enrichment = Some(crate::entities::Enrichment {
            anomaly_score: Some(0.99),
            is_anomaly: Some(true),
            ..crate::entities::Enrichment::default()
        });
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn chain_hash_depends_on_predecessor() {
        let c = "abc";
        assert_ne!(chain_hash(GENESIS_HASH, c), chain_hash("ff", c));
        assert_eq!(chain_hash("ff", c), chain_hash("ff", c));
    }

    #[test]
    fn truncation_keeps_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let t = truncate_to_micros(ts);
        assert_eq!(t.nanosecond(), 123_456_000);
        assert_eq!(format_timestamp(&t), "2023-11-14T22:13:20.123456Z");
    }

    #[test]
    fn intact_chain_verifies() {
        let chain = chain_of(5);
        let (checked, divergence) = verify_sequence(1, GENESIS_HASH, &chain).unwrap();
        assert_eq!(checked, 5);
        assert!(divergence.is_none());
    }

    #[test]
    fn altered_details_detected_at_altered_record() {
        let mut chain = chain_of(3);
        chain[1].action_details = json!({"n": 999});
        let (_, divergence) = verify_sequence(1, GENESIS_HASH, &chain).unwrap();
        let divergence = divergence.unwrap();
        assert_eq!(divergence.seq, 2);
        assert_eq!(divergence.kind, DivergenceKind::ContentMismatch);
    }

    #[test]
    fn rehashed_alteration_breaks_chain_hash() {
        let mut chain = chain_of(3);
        chain[1].action_details = json!({"n": 999});
        chain[1].content_hash = content_hash(&chain[1]).unwrap();
        let (_, divergence) = verify_sequence(1, GENESIS_HASH, &chain).unwrap();
        assert_eq!(divergence.unwrap().kind, DivergenceKind::ChainMismatch);
    }

    #[test]
    fn reordering_detected() {
        let mut chain = chain_of(3);
        chain.swap(1, 2);
        let (_, divergence) = verify_sequence(1, GENESIS_HASH, &chain).unwrap();
        let divergence = divergence.unwrap();
        assert_eq!(divergence.kind, DivergenceKind::SequenceGap);
        assert_eq!(divergence.seq, 3);
    }

    #[test]
    fn partial_range_starts_from_stored_predecessor() {
        let chain = chain_of(4);
        let start_prev = chain[1].chain_hash.clone();
        let (checked, divergence) = verify_sequence(3, &start_prev, &chain[2..]).unwrap();
        assert_eq!(checked, 2);
        assert!(divergence.is_none());
    }
}
