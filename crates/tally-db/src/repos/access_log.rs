//! Meta-audit logger.
//!
//! Every read, query, verification, search, export action, and denied access
//! against the trail appends an [`AccessLogEntry`]. Entries are append-only
//! and carry their own `entry_hash`; they are not chained to each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::chain::truncate_to_micros;
use tally_core::entities::AccessLogEntry;
use tally_core::enums::{AccessAction, AccessOutcome, Operation};
use tally_core::identity::CallerContext;
use tally_core::ids::PREFIX_ACCESS;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_optional_json, ts};
use crate::service::TallyService;

/// Filter criteria for access log inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessLogFilter {
    /// Defaults to the caller's tenant.
    pub tenant: Option<String>,
    pub actor_id: Option<String>,
    pub action: Option<AccessAction>,
    pub security_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl TallyService {
    /// Append a meta-audit entry attributed to `caller`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the insert fails.
    pub async fn log_access(
        &self,
        caller: &CallerContext,
        action: AccessAction,
        target: Option<&str>,
        detail: Option<serde_json::Value>,
        outcome: AccessOutcome,
        is_security_event: bool,
    ) -> Result<AccessLogEntry, DatabaseError> {
        let mut entry = AccessLogEntry {
            id: self.db().generate_id(PREFIX_ACCESS).await?,
            tenant_id: caller.tenant_id.clone(),
            actor_id: caller.user_id.clone(),
            action,
            target: target.map(str::to_string),
            detail,
            outcome,
            is_security_event,
            entry_hash: String::new(),
            occurred_at: truncate_to_micros(Utc::now()),
        };
        entry.entry_hash = entry.compute_hash();

        let detail_text = entry.detail.as_ref().map(ToString::to_string);
        self.db()
            .execute_with(
                "INSERT INTO access_log (id, tenant_id, actor_id, action, target, detail, outcome, is_security_event, entry_hash, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                || {
                    libsql::params![
                        entry.id.as_str(),
                        entry.tenant_id.as_deref(),
                        entry.actor_id.as_str(),
                        entry.action.as_str(),
                        entry.target.as_deref(),
                        detail_text.as_deref(),
                        entry.outcome.as_str(),
                        i64::from(entry.is_security_event),
                        entry.entry_hash.as_str(),
                        ts(&entry.occurred_at)
                    ]
                },
            )
            .await?;

        Ok(entry)
    }

    /// Read the access log. Restricted to auditors and admins of the tenant,
    /// and itself logged.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::PolicyDenied`] for other roles,
    /// [`DatabaseError::TenantScopeViolation`] for another tenant's log, or
    /// `DatabaseError` if the query fails.
    pub async fn query_access_log(
        &self,
        caller: &CallerContext,
        filter: &AccessLogFilter,
    ) -> Result<Vec<AccessLogEntry>, DatabaseError> {
        let scope = Self::effective_scope(caller, filter.tenant.as_deref());
        self.authorize(caller, Operation::InspectAccessLog, scope).await?;

        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        match scope {
            Some(tenant) => {
                params.push(libsql::Value::Text(tenant.to_string()));
                conditions.push(format!("tenant_id = ?{}", params.len()));
            }
            None if caller.is_system => {}
            None => conditions.push("tenant_id IS NULL".to_string()),
        }
        if let Some(ref actor) = filter.actor_id {
            params.push(libsql::Value::Text(actor.clone()));
            conditions.push(format!("actor_id = ?{}", params.len()));
        }
        if let Some(action) = filter.action {
            params.push(libsql::Value::Text(action.as_str().to_string()));
            conditions.push(format!("action = ?{}", params.len()));
        }
        if filter.security_only {
            conditions.push("is_security_event = 1".to_string());
        }
        if let Some(since) = filter.since {
            params.push(libsql::Value::Text(ts(&since)));
            conditions.push(format!("occurred_at >= ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(self.config().general.default_limit);
        let sql = format!(
            "SELECT id, tenant_id, actor_id, action, target, detail, outcome, is_security_event, entry_hash, occurred_at
             FROM access_log {where_clause}
             ORDER BY occurred_at DESC, id DESC LIMIT {limit}"
        );

        let mut rows = self
            .db()
            .query_with(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(AccessLogEntry {
                id: row.get::<String>(0)?,
                tenant_id: get_opt_string(&row, 1)?,
                actor_id: row.get::<String>(2)?,
                action: parse_enum(&row.get::<String>(3)?)?,
                target: get_opt_string(&row, 4)?,
                detail: parse_optional_json(get_opt_string(&row, 5)?.as_deref())?,
                outcome: parse_enum(&row.get::<String>(6)?)?,
                is_security_event: row.get::<i64>(7)? != 0,
                entry_hash: row.get::<String>(8)?,
                occurred_at: parse_datetime(&row.get::<String>(9)?)?,
            });
        }

        self.log_access(
            caller,
            AccessAction::AccessLogRead,
            scope,
            Some(serde_json::json!({ "returned": entries.len() })),
            AccessOutcome::Allowed,
            false,
        )
        .await?;

        Ok(entries)
    }
}
