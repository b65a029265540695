//! Event store: append, point lookup, range query, chain tail.
//!
//! Appends are optimistic. The writer reads its chain's tail, computes the
//! new record's hashes against it, and inserts. The unique indexes on
//! `(chain_key, seq)` and `(chain_key, prev_hash)` are the check-and-set: if
//! another writer committed first, the insert fails and surfaces as
//! [`DatabaseError::IntegrityViolation`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::chain::{self, GENESIS_HASH, canonical_json_string, canonicalize_json, truncate_to_micros};
use tally_core::entities::{AuditRecord, Enrichment, RecordCandidate};
use tally_core::enums::{AccessAction, AccessOutcome, Operation, Severity};
use tally_core::identity::CallerContext;
use tally_core::ids::PREFIX_RECORD;

use crate::error::DatabaseError;
use crate::helpers::{
    get_opt_bool, get_opt_string, parse_datetime, parse_enum, parse_json, parse_optional_datetime,
    parse_string_list, to_u32, ts,
};
use crate::policy::tenant_filter_sql;
use crate::service::TallyService;

/// Columns selected for every record read, enrichment joined from the side-table.
pub(crate) const RECORD_SELECT: &str = "SELECT r.id, r.tenant_id, r.seq, r.event_type, r.entity_type, r.entity_id,
        r.action_details, r.severity, r.actor_id, r.occurred_at, r.content_hash, r.prev_hash, r.chain_hash,
        e.record_id, e.embedded_at, e.anomaly_score, e.is_anomaly, e.category, e.risk_level, e.tags,
        e.scored_at, e.review_status, e.reviewed_by, e.reviewed_at, e.attempts, e.last_error
     FROM audit_records r
     LEFT JOIN record_enrichment e ON e.record_id = r.id";

/// Parse a row produced by [`RECORD_SELECT`].
///
/// The embedding vector itself is not loaded; see the enrichment repo.
pub(crate) fn record_from_row(row: &libsql::Row) -> Result<AuditRecord, DatabaseError> {
    let enrichment = match get_opt_string(row, 13)? {
        Some(_) => Some(Enrichment {
            embedding: None,
            embedded_at: parse_optional_datetime(get_opt_string(row, 14)?.as_deref())?,
            anomaly_score: row.get::<Option<f64>>(15)?,
            is_anomaly: get_opt_bool(row, 16)?,
            category: get_opt_string(row, 17)?,
            risk_level: get_opt_string(row, 18)?
                .map(|s| parse_enum(&s))
                .transpose()?,
            tags: parse_string_list(get_opt_string(row, 19)?.as_deref())?,
            scored_at: parse_optional_datetime(get_opt_string(row, 20)?.as_deref())?,
            review_status: get_opt_string(row, 21)?
                .map(|s| parse_enum(&s))
                .transpose()?,
            reviewed_by: get_opt_string(row, 22)?,
            reviewed_at: parse_optional_datetime(get_opt_string(row, 23)?.as_deref())?,
            attempts: to_u32(row.get::<i64>(24)?, "attempts")?,
            last_error: get_opt_string(row, 25)?,
        }),
        None => None,
    };

    Ok(AuditRecord {
        id: row.get::<String>(0)?,
        tenant_id: get_opt_string(row, 1)?,
        seq: row.get::<i64>(2)?,
        event_type: row.get::<String>(3)?,
        entity_type: row.get::<String>(4)?,
        entity_id: row.get::<String>(5)?,
        action_details: parse_json(&row.get::<String>(6)?)?,
        severity: parse_enum(&row.get::<String>(7)?)?,
        actor_id: get_opt_string(row, 8)?,
        occurred_at: parse_datetime(&row.get::<String>(9)?)?,
        content_hash: row.get::<String>(10)?,
        prev_hash: row.get::<String>(11)?,
        chain_hash: row.get::<String>(12)?,
        enrichment,
    })
}

/// Storage key of a chain: the tenant ID, or `''` for the shared baseline.
pub(crate) fn chain_key(tenant_id: Option<&str>) -> &str {
    tenant_id.unwrap_or("")
}

/// Last committed position of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTail {
    /// `0` for an empty chain.
    pub seq: i64,
    /// [`GENESIS_HASH`] for an empty chain.
    pub chain_hash: String,
}

impl ChainTail {
    fn genesis() -> Self {
        Self {
            seq: 0,
            chain_hash: GENESIS_HASH.to_string(),
        }
    }
}

/// Filter criteria for range queries.
///
/// `tenant = None` means the caller's own tenant (every chain for the system
/// identity). Results are ordered by `occurred_at` descending, ties by `seq`
/// descending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Inclusive lower bound on `occurred_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `occurred_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Also return shared baseline records.
    #[serde(default)]
    pub include_shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl TallyService {
    /// Append a record to the candidate's chain.
    ///
    /// Computes `content_hash`, reads the chain tail, links `chain_hash` to
    /// it, assigns `id`/`occurred_at` when absent, and commits.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::MalformedCandidate`] if validation fails.
    /// - [`DatabaseError::TenantScopeViolation`] if the candidate's tenant is
    ///   not the caller's and the caller is not the system identity.
    /// - [`DatabaseError::IntegrityViolation`] if another writer extended the
    ///   chain between the tail read and the commit.
    pub async fn append(
        &self,
        caller: &CallerContext,
        candidate: RecordCandidate,
    ) -> Result<AuditRecord, DatabaseError> {
        self.admit_candidate(caller, &candidate).await?;
        let tail = self.read_tail(candidate.tenant_id.as_deref()).await?;
        self.commit_record(candidate, &tail).await
    }

    /// Append against an explicitly supplied predecessor hash.
    ///
    /// Fails with [`DatabaseError::IntegrityViolation`] unless
    /// `expected_prev` is still the chain's tail at commit time.
    ///
    /// # Errors
    ///
    /// Same as [`Self::append`].
    pub async fn append_at(
        &self,
        caller: &CallerContext,
        candidate: RecordCandidate,
        expected_prev: &str,
    ) -> Result<AuditRecord, DatabaseError> {
        self.admit_candidate(caller, &candidate).await?;
        let key = chain_key(candidate.tenant_id.as_deref());

        let tail = if expected_prev == GENESIS_HASH {
            ChainTail::genesis()
        } else {
            let mut rows = self
                .db()
                .query_with(
                    "SELECT seq FROM audit_records WHERE chain_key = ?1 AND chain_hash = ?2",
                    || libsql::params![key, expected_prev],
                )
                .await?;
            let Some(row) = rows.next().await? else {
                return Err(DatabaseError::IntegrityViolation {
                    chain: key.to_string(),
                    expected_prev: expected_prev.to_string(),
                });
            };
            ChainTail {
                seq: row.get::<i64>(0)?,
                chain_hash: expected_prev.to_string(),
            }
        };

        self.commit_record(candidate, &tail).await
    }

    /// [`Self::append`], re-reading the tail and backing off when the chain
    /// race is lost or the database is briefly locked.
    ///
    /// # Errors
    ///
    /// Returns the last error once `chain.max_append_attempts` is exhausted,
    /// or any non-retryable error immediately.
    pub async fn append_with_retry(
        &self,
        caller: &CallerContext,
        candidate: RecordCandidate,
    ) -> Result<AuditRecord, DatabaseError> {
        let retry = self.chain_retry();
        let mut attempt = 1;
        loop {
            match self.append(caller, candidate.clone()).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    tracing::debug!(
                        tenant = candidate.tenant_id.as_deref().unwrap_or("<shared>"),
                        attempt,
                        ?delay,
                        error = %e,
                        "append lost the chain race, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Current tail of a chain.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not read the chain or the
    /// query fails.
    pub async fn chain_tail(
        &self,
        caller: &CallerContext,
        tenant_id: Option<&str>,
    ) -> Result<ChainTail, DatabaseError> {
        self.authorize(caller, Operation::Read, tenant_id).await?;
        self.read_tail(tenant_id).await
    }

    /// Point lookup by ID.
    ///
    /// Records of another concrete tenant are reported exactly like records
    /// that do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if no visible record has this ID.
    pub async fn get_record(
        &self,
        caller: &CallerContext,
        id: &str,
    ) -> Result<AuditRecord, DatabaseError> {
        let scope = Self::effective_scope(caller, None);
        self.authorize(caller, Operation::Read, scope).await?;

        let (tenant_sql, mut params) = tenant_filter_sql(caller, scope, true, "r.tenant_id", 2);
        params.insert(0, libsql::Value::Text(id.to_string()));
        let sql = format!("{RECORD_SELECT} WHERE r.id = ?1 {tenant_sql}");

        let mut rows = self
            .db()
            .query_with(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let record = match rows.next().await? {
            Some(row) => Some(record_from_row(&row)?),
            None => None,
        };

        self.log_access(
            caller,
            AccessAction::Lookup,
            Some(id),
            Some(serde_json::json!({ "found": record.is_some() })),
            AccessOutcome::Allowed,
            false,
        )
        .await?;

        record.ok_or_else(|| DatabaseError::NotFound {
            entity_type: "audit record",
            id: id.to_string(),
        })
    }

    /// Range query by tenant, time window, and attribute filters.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TenantScopeViolation`] if `filter.tenant`
    /// names another tenant, or `DatabaseError` if the query fails.
    pub async fn query_records(
        &self,
        caller: &CallerContext,
        filter: &RecordFilter,
    ) -> Result<Vec<AuditRecord>, DatabaseError> {
        let scope = Self::effective_scope(caller, filter.tenant.as_deref());
        self.authorize(caller, Operation::Read, scope).await?;

        let records = self.select_records(caller, filter).await?;

        self.log_access(
            caller,
            AccessAction::Query,
            scope,
            Some(serde_json::json!({
                "filter": serde_json::to_value(filter).unwrap_or_default(),
                "returned": records.len(),
            })),
            AccessOutcome::Allowed,
            false,
        )
        .await?;

        Ok(records)
    }

    /// Unlogged range query. Callers must have authorized the scope.
    pub(crate) async fn select_records(
        &self,
        caller: &CallerContext,
        filter: &RecordFilter,
    ) -> Result<Vec<AuditRecord>, DatabaseError> {
        let scope = Self::effective_scope(caller, filter.tenant.as_deref());
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(from) = filter.from {
            params.push(libsql::Value::Text(ts(&from)));
            conditions.push(format!("r.occurred_at >= ?{}", params.len()));
        }
        if let Some(to) = filter.to {
            params.push(libsql::Value::Text(ts(&to)));
            conditions.push(format!("r.occurred_at < ?{}", params.len()));
        }
        if let Some(ref event_type) = filter.event_type {
            params.push(libsql::Value::Text(event_type.clone()));
            conditions.push(format!("r.event_type = ?{}", params.len()));
        }
        if let Some(severity) = filter.severity {
            params.push(libsql::Value::Text(severity.as_str().to_string()));
            conditions.push(format!("r.severity = ?{}", params.len()));
        }
        if let Some(ref entity_type) = filter.entity_type {
            params.push(libsql::Value::Text(entity_type.clone()));
            conditions.push(format!("r.entity_type = ?{}", params.len()));
        }
        if let Some(ref entity_id) = filter.entity_id {
            params.push(libsql::Value::Text(entity_id.clone()));
            conditions.push(format!("r.entity_id = ?{}", params.len()));
        }

        let (tenant_sql, tenant_params) =
            tenant_filter_sql(caller, scope, filter.include_shared, "r.tenant_id", params.len() + 1);
        params.extend(tenant_params);

        let where_clause = if conditions.is_empty() {
            "WHERE 1 = 1".to_string()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.unwrap_or(self.config().general.default_limit);
        let sql = format!(
            "{RECORD_SELECT} {where_clause} {tenant_sql}
             ORDER BY r.occurred_at DESC, r.seq DESC LIMIT {limit}"
        );

        let mut rows = self
            .db()
            .query_with(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(record_from_row(&row)?);
        }
        Ok(records)
    }

    // -- internals ----------------------------------------------------------

    async fn admit_candidate(
        &self,
        caller: &CallerContext,
        candidate: &RecordCandidate,
    ) -> Result<(), DatabaseError> {
        self.authorize(caller, Operation::Write, candidate.tenant_id.as_deref())
            .await?;
        candidate.validate(caller)?;
        Ok(())
    }

    pub(crate) async fn read_tail(&self, tenant_id: Option<&str>) -> Result<ChainTail, DatabaseError> {
        let key = chain_key(tenant_id);
        let mut rows = self
            .db()
            .query_with(
                "SELECT seq, chain_hash FROM audit_records WHERE chain_key = ?1 ORDER BY seq DESC LIMIT 1",
                || [key],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(ChainTail {
                seq: row.get::<i64>(0)?,
                chain_hash: row.get::<String>(1)?,
            }),
            None => Ok(ChainTail::genesis()),
        }
    }

    async fn commit_record(
        &self,
        candidate: RecordCandidate,
        tail: &ChainTail,
    ) -> Result<AuditRecord, DatabaseError> {
        let id = match candidate.id {
            Some(id) => id,
            None => self.db().generate_id(PREFIX_RECORD).await?,
        };
        let occurred_at = truncate_to_micros(candidate.occurred_at.unwrap_or_else(Utc::now));

        let mut record = AuditRecord {
            id,
            tenant_id: candidate.tenant_id,
            seq: tail.seq + 1,
            event_type: candidate.event_type,
            entity_type: candidate.entity_type,
            entity_id: candidate.entity_id,
            action_details: canonicalize_json(&candidate.action_details),
            severity: candidate.severity,
            actor_id: candidate.actor_id,
            occurred_at,
            content_hash: String::new(),
            prev_hash: tail.chain_hash.clone(),
            chain_hash: String::new(),
            enrichment: None,
        };
        record.content_hash = chain::content_hash(&record)?;
        record.chain_hash = chain::chain_hash(&record.prev_hash, &record.content_hash);

        let details = canonical_json_string(&record.action_details)?;
        let key = chain_key(record.tenant_id.as_deref()).to_string();
        let result = self
            .db()
            .execute_with(
                "INSERT INTO audit_records (id, tenant_id, chain_key, seq, event_type, entity_type, entity_id,
                    action_details, severity, actor_id, occurred_at, content_hash, prev_hash, chain_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                || {
                    libsql::params![
                        record.id.as_str(),
                        record.tenant_id.as_deref(),
                        key.as_str(),
                        record.seq,
                        record.event_type.as_str(),
                        record.entity_type.as_str(),
                        record.entity_id.as_str(),
                        details.as_str(),
                        record.severity.as_str(),
                        record.actor_id.as_deref(),
                        ts(&record.occurred_at),
                        record.content_hash.as_str(),
                        record.prev_hash.as_str(),
                        record.chain_hash.as_str()
                    ]
                },
            )
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    tenant = %key,
                    record_id = %record.id,
                    chain_seq = record.seq,
                    event_type = %record.event_type,
                    "record appended"
                );
                Ok(record)
            }
            Err(DatabaseError::LibSql(e)) => Err(classify_insert_error(e, &key, &tail.chain_hash)),
            Err(e) => Err(e),
        }
    }
}

/// Map a failed record insert onto the store's error taxonomy.
fn classify_insert_error(e: libsql::Error, key: &str, expected_prev: &str) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed: audit_records.chain_key") {
        tracing::debug!(tenant = key, "chain tail moved before commit");
        DatabaseError::IntegrityViolation {
            chain: key.to_string(),
            expected_prev: expected_prev.to_string(),
        }
    } else if msg.contains("UNIQUE constraint failed: audit_records.id") {
        DatabaseError::MalformedCandidate("a record with this id already exists".into())
    } else {
        DatabaseError::LibSql(e)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tally_core::enums::Role;

    use super::*;
    use crate::test_support::helpers::{append_n, candidate, member, test_service};

    #[tokio::test]
    async fn first_record_links_to_genesis() {
        let svc = test_service().await;
        let acme = member("acme");
        let record = svc.append(&acme, candidate(&acme, "created")).await.unwrap();

        assert_eq!(record.seq, 1);
        assert_eq!(record.prev_hash, GENESIS_HASH);
        assert_eq!(record.chain_hash, chain::chain_hash(GENESIS_HASH, &record.content_hash));
        assert!(record.id.starts_with("evt-"));
    }

    #[tokio::test]
    async fn records_link_to_predecessor() {
        let svc = test_service().await;
        let acme = member("acme");
        let records = append_n(&svc, &acme, 3).await;

        assert_eq!(records[1].prev_hash, records[0].chain_hash);
        assert_eq!(records[2].prev_hash, records[1].chain_hash);
        assert_eq!(records[2].seq, 3);
    }

    #[tokio::test]
    async fn tenants_have_independent_chains() {
        let svc = test_service().await;
        let acme = member("acme");
        let globex = member("globex");
        append_n(&svc, &acme, 2).await;
        let first_globex = svc.append(&globex, candidate(&globex, "created")).await.unwrap();

        assert_eq!(first_globex.seq, 1);
        assert_eq!(first_globex.prev_hash, GENESIS_HASH);
    }

    #[tokio::test]
    async fn stored_record_rehashes_identically() {
        let svc = test_service().await;
        let acme = member("acme");
        let appended = svc
            .append(
                &acme,
                RecordCandidate::for_caller(
                    &acme,
                    "updated",
                    "project",
                    "prj-9",
                    Severity::Warning,
                    json!({ "z": 1, "a": { "y": [3, 2, 1], "b": null } }),
                ),
            )
            .await
            .unwrap();

        let loaded = svc.get_record(&acme, &appended.id).await.unwrap();
        assert_eq!(loaded, appended);
        assert_eq!(chain::content_hash(&loaded).unwrap(), loaded.content_hash);
    }

    #[tokio::test]
    async fn stale_tail_fails_with_integrity_violation() {
        let svc = test_service().await;
        let acme = member("acme");
        let first = svc.append(&acme, candidate(&acme, "a")).await.unwrap();
        let stale = first.chain_hash.clone();

        // Another writer wins the race for the tail.
        svc.append_at(&acme, candidate(&acme, "b"), &stale).await.unwrap();

        let err = svc
            .append_at(&acme, candidate(&acme, "c"), &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::IntegrityViolation { .. }), "{err}");
    }

    #[tokio::test]
    async fn unknown_predecessor_is_integrity_violation() {
        let svc = test_service().await;
        let acme = member("acme");
        let err = svc
            .append_at(&acme, candidate(&acme, "a"), &"f".repeat(64))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::IntegrityViolation { .. }));
    }

    #[tokio::test]
    async fn genesis_twice_is_a_fork() {
        let svc = test_service().await;
        let acme = member("acme");
        svc.append_at(&acme, candidate(&acme, "a"), GENESIS_HASH).await.unwrap();
        let err = svc
            .append_at(&acme, candidate(&acme, "b"), GENESIS_HASH)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn foreign_tenant_candidate_rejected() {
        let svc = test_service().await;
        let acme = member("acme");
        let mut c = candidate(&acme, "created");
        c.tenant_id = Some("globex".into());

        let err = svc.append(&acme, c).await.unwrap_err();
        assert!(matches!(err, DatabaseError::TenantScopeViolation { .. }));
        assert_eq!(svc.read_tail(Some("globex")).await.unwrap().seq, 0);
    }

    #[tokio::test]
    async fn shared_baseline_writable_only_by_system() {
        let svc = test_service().await;
        let acme = member("acme");
        let mut c = candidate(&acme, "baseline");
        c.tenant_id = None;
        let err = svc.append(&acme, c.clone()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::TenantScopeViolation { .. }));

        let record = svc.append(&CallerContext::system(), c).await.unwrap();
        assert_eq!(record.tenant_id, None);
        assert_eq!(record.seq, 1);
    }

    #[tokio::test]
    async fn malformed_candidate_commits_nothing() {
        let svc = test_service().await;
        let acme = member("acme");
        let mut c = candidate(&acme, "created");
        c.action_details = json!(["not", "an", "object"]);

        let err = svc.append(&acme, c).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedCandidate(_)));
        assert_eq!(svc.read_tail(Some("acme")).await.unwrap().seq, 0);
    }

    #[tokio::test]
    async fn duplicate_id_is_malformed() {
        let svc = test_service().await;
        let acme = member("acme");
        let mut c = candidate(&acme, "created");
        c.id = Some("evt-fixed".into());
        svc.append(&acme, c.clone()).await.unwrap();
        let err = svc.append(&acme, c).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedCandidate(_)), "{err}");
    }

    #[tokio::test]
    async fn viewer_cannot_append() {
        let svc = test_service().await;
        let viewer = CallerContext::tenant("acme", "v-1", Role::Viewer);
        let err = svc.append(&viewer, candidate(&viewer, "x")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::PolicyDenied { .. }));
    }

    #[tokio::test]
    async fn query_orders_newest_first_and_filters() {
        let svc = test_service().await;
        let acme = member("acme");
        let records = append_n(&svc, &acme, 4).await;

        let all = svc.query_records(&acme, &RecordFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, records[3].id);

        let filtered = svc
            .query_records(
                &acme,
                &RecordFilter {
                    event_type: Some("event_1".into()),
                    ..RecordFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, records[1].id);
    }

    #[tokio::test]
    async fn query_time_window_is_half_open() {
        let svc = test_service().await;
        let acme = member("acme");
        let t0 = DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z").unwrap().with_timezone(&Utc);
        for hours in 0..3 {
            let mut c = candidate(&acme, "tick");
            c.occurred_at = Some(t0 + chrono::Duration::hours(hours));
            svc.append(&acme, c).await.unwrap();
        }
        let window = svc
            .query_records(
                &acme,
                &RecordFilter {
                    from: Some(t0),
                    to: Some(t0 + chrono::Duration::hours(2)),
                    ..RecordFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn chain_tail_tracks_last_append() {
        let svc = test_service().await;
        let acme = member("acme");
        assert_eq!(svc.chain_tail(&acme, Some("acme")).await.unwrap().chain_hash, GENESIS_HASH);
        let records = append_n(&svc, &acme, 2).await;
        let tail = svc.chain_tail(&acme, Some("acme")).await.unwrap();
        assert_eq!(tail.seq, 2);
        assert_eq!(tail.chain_hash, records[1].chain_hash);
    }
}
