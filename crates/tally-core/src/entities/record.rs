use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::Enrichment;
use crate::enums::Severity;
use crate::errors::CoreError;
use crate::identity::CallerContext;

/// Maximum length of `event_type`, `entity_type`, `entity_id`, and `actor_id`.
pub const MAX_IDENT_LEN: usize = 256;

/// A committed, hash-chained audit record.
///
/// Everything except `enrichment` is immutable once appended. `enrichment`
/// is an annotation loaded from a side-table and never hashed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AuditRecord {
    pub id: String,
    /// Owning tenant. `None` marks a shared baseline record.
    pub tenant_id: Option<String>,
    /// 1-based position within the owning chain.
    pub seq: i64,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action_details: serde_json::Value,
    pub severity: Severity,
    /// `None` only for system-generated events.
    pub actor_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub content_hash: String,
    pub prev_hash: String,
    pub chain_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

impl AuditRecord {
    /// Text handed to the embedding model for this record.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {} severity:{} {}",
            self.event_type,
            self.entity_type,
            self.entity_id,
            self.severity,
            self.action_details
        )
    }
}

/// The fields a caller supplies when appending a record.
///
/// `id` and `occurred_at` are assigned by the store when absent; hashes and
/// sequence numbers are always computed by the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RecordCandidate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default = "empty_details")]
    pub action_details: serde_json::Value,
    pub severity: Severity,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

fn empty_details() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl RecordCandidate {
    /// A candidate scoped to the caller's tenant, attributed to the caller.
    #[must_use]
    pub fn for_caller(
        caller: &CallerContext,
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        severity: Severity,
        action_details: serde_json::Value,
    ) -> Self {
        Self {
            id: None,
            tenant_id: caller.tenant_id.clone(),
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            action_details,
            severity,
            actor_id: Some(caller.user_id.clone()),
            occurred_at: None,
        }
    }

    /// Shape checks applied before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] describing the first problem found.
    pub fn validate(&self, caller: &CallerContext) -> Result<(), CoreError> {
        for (field, value) in [
            ("event_type", self.event_type.as_str()),
            ("entity_type", self.entity_type.as_str()),
            ("entity_id", self.entity_id.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{field} must not be empty")));
            }
            if value.len() > MAX_IDENT_LEN {
                return Err(CoreError::Validation(format!(
                    "{field} exceeds {MAX_IDENT_LEN} characters"
                )));
            }
        }

        if !self.action_details.is_object() {
            return Err(CoreError::Validation(
                "action_details must be a JSON object".into(),
            ));
        }

        match self.actor_id.as_deref() {
            None if !caller.is_system => {
                return Err(CoreError::Validation(
                    "actor_id is required for non-system callers".into(),
                ));
            }
            Some(actor) if actor.trim().is_empty() || actor.len() > MAX_IDENT_LEN => {
                return Err(CoreError::Validation("actor_id is malformed".into()));
            }
            _ => {}
        }

        if self
            .id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty() || id.len() > MAX_IDENT_LEN)
        {
            return Err(CoreError::Validation("id is malformed".into()));
        }

        if self
            .tenant_id
            .as_deref()
            .is_some_and(|tenant| tenant.trim().is_empty())
        {
            return Err(CoreError::Validation(
                "tenant_id must be absent or non-empty".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::enums::Role;

    fn member() -> CallerContext {
        CallerContext::tenant("acme", "u-1", Role::Member)
    }

    fn candidate() -> RecordCandidate {
        RecordCandidate::for_caller(
            &member(),
            "project_updated",
            "project",
            "prj-1",
            Severity::Info,
            json!({"field": "budget"}),
        )
    }

    #[test]
    fn valid_candidate_passes() {
        assert!(candidate().validate(&member()).is_ok());
    }

    #[test]
    fn empty_event_type_rejected() {
        let mut c = candidate();
        c.event_type = "  ".into();
        assert!(matches!(c.validate(&member()), Err(CoreError::Validation(_))));
    }

    #[test]
    fn non_object_details_rejected() {
        let mut c = candidate();
        c.action_details = json!([1, 2]);
        assert!(c.validate(&member()).is_err());
    }

    #[test]
    fn missing_actor_only_allowed_for_system() {
        let mut c = candidate();
        c.actor_id = None;
        assert!(c.validate(&member()).is_err());
        assert!(c.validate(&CallerContext::system()).is_ok());
    }

    #[test]
    fn overlong_entity_id_rejected() {
        let mut c = candidate();
        c.entity_id = "x".repeat(MAX_IDENT_LEN + 1);
        assert!(c.validate(&member()).is_err());
    }

    #[test]
    fn details_default_to_empty_object() {
        let c: RecordCandidate = serde_json::from_value(json!({
            "event_type": "login",
            "entity_type": "user",
            "entity_id": "u-1",
            "severity": "info",
            "actor_id": "u-1"
        }))
        .unwrap();
        assert_eq!(c.action_details, json!({}));
        assert!(c.tenant_id.is_none());
    }
}
