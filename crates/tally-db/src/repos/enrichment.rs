//! Enrichment side-table.
//!
//! Embeddings and scores live in `record_enrichment`, keyed by record ID,
//! and are never part of a record's content or chain hash. Every write here
//! is a single statement guarded so it applies at most once per value:
//!
//! - an embedding is only stored while none is present;
//! - scores are only stored while none are present;
//! - only an explicit, audited regenerate clears them again.
//!
//! A failed attempt bumps `attempts`, records `last_error`, and pushes
//! `next_attempt_at` out with capped exponential backoff, so failing records
//! stay visibly unenriched and re-enter the queue later.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tally_core::audit_detail::{
    AnomalyReviewDetail, ENTITY_AUDIT_RECORD, EVENT_ANOMALY_REVIEWED, EVENT_ENRICHMENT_REGENERATED,
    RegenerateDetail,
};
use tally_core::chain::truncate_to_micros;
use tally_core::entities::{AuditRecord, RecordCandidate};
use tally_core::enums::{Operation, ReviewStatus, RiskLevel, Severity};
use tally_core::identity::CallerContext;

use crate::error::DatabaseError;
use crate::helpers::{
    decode_embedding, encode_embedding, get_opt_string, parse_datetime, string_list_json, to_u32,
    to_u64, ts,
};
use crate::policy::tenant_filter_sql;
use crate::repos::records::{RECORD_SELECT, record_from_row};
use crate::service::TallyService;

/// Which chains an enrichment pass covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentScope {
    Tenant(String),
    /// The shared baseline chain.
    Shared,
    /// Every chain. System identity only.
    All,
}

impl EnrichmentScope {
    fn target(&self) -> Option<&str> {
        match self {
            Self::Tenant(t) => Some(t),
            Self::Shared | Self::All => None,
        }
    }

    fn sql(&self, column: &str, idx: usize) -> (String, Vec<libsql::Value>) {
        match self {
            Self::Tenant(t) => (
                format!("AND {column} = ?{idx}"),
                vec![libsql::Value::Text(t.clone())],
            ),
            Self::Shared => (format!("AND {column} IS NULL"), vec![]),
            Self::All => (String::new(), vec![]),
        }
    }
}

/// Output of the scoring stage for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    /// In `[0, 1]`.
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub category: Option<String>,
    pub risk_level: RiskLevel,
    pub tags: Vec<String>,
}

/// Enrichment progress over a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub total: u64,
    pub embedded: u64,
    pub scored: u64,
    pub anomalies: u64,
    pub reviewed: u64,
    /// Attempted at least once and still not scored.
    pub failing: u64,
    /// Not yet scored, failing or not.
    pub pending: u64,
}

impl Coverage {
    /// Fraction of records fully scored. `1.0` for an empty scope.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.scored as f64 / self.total as f64
        }
    }
}

/// Search-side filters applied in SQL before any similarity is computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingScan {
    /// Defaults to the caller's tenant.
    pub tenant: Option<String>,
    pub include_shared: bool,
    pub event_type: Option<String>,
    pub severity: Option<Severity>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub anomalies_only: bool,
}

/// A record's embedding plus what ranking needs to break ties.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedCandidate {
    pub record_id: String,
    pub tenant_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

impl TallyService {
    /// Oldest records in `scope` that are not yet scored and not backing off.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not annotate the scope or
    /// the query fails.
    pub async fn pending_enrichment(
        &self,
        caller: &CallerContext,
        scope: &EnrichmentScope,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, DatabaseError> {
        self.authorize_scope(caller, scope).await?;

        let now = ts(&Utc::now());
        let (scope_sql, scope_params) = scope.sql("r.tenant_id", 2);
        let mut params = vec![libsql::Value::Text(now)];
        params.extend(scope_params);

        let sql = format!(
            "{RECORD_SELECT}
             WHERE (e.record_id IS NULL
                    OR (e.scored_at IS NULL AND (e.next_attempt_at IS NULL OR e.next_attempt_at <= ?1)))
             {scope_sql}
             ORDER BY r.occurred_at ASC, r.seq ASC LIMIT {limit}"
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

    /// Store a record's embedding unless one is already present.
    ///
    /// Returns `false` when the record was already embedded (nothing changed).
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not annotate the record or
    /// the write fails.
    pub async fn store_embedding(
        &self,
        caller: &CallerContext,
        record_id: &str,
        embedding: &[f32],
    ) -> Result<bool, DatabaseError> {
        self.authorize_record(caller, record_id, Operation::Annotate).await?;
        if embedding.is_empty() {
            return Err(DatabaseError::MalformedCandidate("embedding is empty".into()));
        }

        let blob = encode_embedding(embedding);
        let dim = i64::try_from(embedding.len()).map_err(anyhow::Error::from)?;
        let now = ts(&Utc::now());
        let changed = self
            .db()
            .execute_with(
                "INSERT INTO record_enrichment (record_id, embedding, embedding_dim, embedded_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(record_id) DO UPDATE SET
                    embedding = excluded.embedding,
                    embedding_dim = excluded.embedding_dim,
                    embedded_at = excluded.embedded_at,
                    last_error = NULL,
                    next_attempt_at = NULL
                 WHERE record_enrichment.embedding IS NULL",
                || libsql::params![record_id, blob.clone(), dim, now.as_str()],
            )
            .await?;

        tracing::debug!(record_id, stored = changed > 0, "embedding write");
        Ok(changed > 0)
    }

    /// Store a record's scores unless already scored.
    ///
    /// All score fields are written in one statement.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not annotate the record, the
    /// score is out of range, or the write fails.
    pub async fn store_scores(
        &self,
        caller: &CallerContext,
        record_id: &str,
        scores: &ScoreUpdate,
    ) -> Result<bool, DatabaseError> {
        self.authorize_record(caller, record_id, Operation::Annotate).await?;
        if !(0.0..=1.0).contains(&scores.anomaly_score) {
            return Err(DatabaseError::MalformedCandidate(format!(
                "anomaly_score {} outside [0, 1]",
                scores.anomaly_score
            )));
        }

        let tags = string_list_json(Some(&scores.tags))?;
        let now = ts(&Utc::now());
        let changed = self
            .db()
            .execute_with(
                "INSERT INTO record_enrichment (record_id, anomaly_score, is_anomaly, category, risk_level, tags, scored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(record_id) DO UPDATE SET
                    anomaly_score = excluded.anomaly_score,
                    is_anomaly = excluded.is_anomaly,
                    category = excluded.category,
                    risk_level = excluded.risk_level,
                    tags = excluded.tags,
                    scored_at = excluded.scored_at,
                    attempts = 0,
                    last_error = NULL,
                    next_attempt_at = NULL
                 WHERE record_enrichment.scored_at IS NULL",
                || {
                    libsql::params![
                        record_id,
                        scores.anomaly_score,
                        i64::from(scores.is_anomaly),
                        scores.category.as_deref(),
                        scores.risk_level.as_str(),
                        tags.as_deref(),
                        now.as_str()
                    ]
                },
            )
            .await?;

        tracing::debug!(record_id, stored = changed > 0, anomaly = scores.is_anomaly, "score write");
        Ok(changed > 0)
    }

    /// Record a failed enrichment attempt and schedule the next one.
    ///
    /// Returns the new attempt count.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not annotate the record or
    /// the write fails.
    pub async fn record_enrichment_failure(
        &self,
        caller: &CallerContext,
        record_id: &str,
        error: &str,
    ) -> Result<u32, DatabaseError> {
        self.authorize_record(caller, record_id, Operation::Annotate).await?;

        let mut rows = self
            .db()
            .query_with(
                "SELECT attempts FROM record_enrichment WHERE record_id = ?1",
                || [record_id],
            )
            .await?;
        let previous = match rows.next().await? {
            Some(row) => to_u32(row.get::<i64>(0)?, "attempts")?,
            None => 0,
        };
        let attempts = previous.saturating_add(1);

        let cfg = &self.config().enrichment;
        let factor = 2u64.saturating_pow(attempts - 1);
        let delay_secs = cfg
            .retry_base_delay_secs
            .saturating_mul(factor)
            .min(cfg.retry_max_delay_secs);
        let next = Utc::now() + Duration::seconds(i64::try_from(delay_secs).unwrap_or(i64::MAX / 1_000));

        self.db()
            .execute_with(
                "INSERT INTO record_enrichment (record_id, attempts, last_error, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(record_id) DO UPDATE SET
                    attempts = excluded.attempts,
                    last_error = excluded.last_error,
                    next_attempt_at = excluded.next_attempt_at
                 WHERE record_enrichment.scored_at IS NULL",
                || libsql::params![record_id, i64::from(attempts), error, ts(&next)],
            )
            .await?;

        tracing::warn!(record_id, attempts, retry_in_secs = delay_secs, error, "enrichment attempt failed");
        Ok(attempts)
    }

    /// Stored embedding of a visible record, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if the record is not visible.
    pub async fn get_embedding(
        &self,
        caller: &CallerContext,
        record_id: &str,
    ) -> Result<Option<Vec<f32>>, DatabaseError> {
        self.authorize_record(caller, record_id, Operation::Read).await?;
        let mut rows = self
            .db()
            .query_with(
                "SELECT embedding FROM record_enrichment WHERE record_id = ?1",
                || [record_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row
                .get::<Option<Vec<u8>>>(0)?
                .map(|blob| decode_embedding(&blob))
                .transpose(),
            None => Ok(None),
        }
    }

    /// Enrichment progress over `scope`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not read the scope or the
    /// query fails.
    pub async fn coverage(
        &self,
        caller: &CallerContext,
        scope: &EnrichmentScope,
    ) -> Result<Coverage, DatabaseError> {
        if matches!(scope, EnrichmentScope::All) && !caller.is_system {
            return Err(DatabaseError::PolicyDenied {
                operation: Operation::Read,
            });
        }
        self.authorize(caller, Operation::Read, scope.target()).await?;

        let (scope_sql, params) = scope.sql("r.tenant_id", 1);
        let sql = format!(
            "SELECT count(*),
                    count(e.embedded_at),
                    count(e.scored_at),
                    coalesce(sum(CASE WHEN e.is_anomaly = 1 THEN 1 ELSE 0 END), 0),
                    count(e.review_status),
                    coalesce(sum(CASE WHEN e.attempts > 0 AND e.scored_at IS NULL THEN 1 ELSE 0 END), 0)
             FROM audit_records r
             LEFT JOIN record_enrichment e ON e.record_id = r.id
             WHERE 1 = 1 {scope_sql}"
        );
        let mut rows = self
            .db()
            .query_with(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;

        let total = to_u64(row.get::<i64>(0)?, "total")?;
        let scored = to_u64(row.get::<i64>(2)?, "scored")?;
        Ok(Coverage {
            total,
            embedded: to_u64(row.get::<i64>(1)?, "embedded")?,
            scored,
            anomalies: to_u64(row.get::<i64>(3)?, "anomalies")?,
            reviewed: to_u64(row.get::<i64>(4)?, "reviewed")?,
            failing: to_u64(row.get::<i64>(5)?, "failing")?,
            pending: total.saturating_sub(scored),
        })
    }

    /// Clear a record's enrichment so the pipeline recomputes it.
    ///
    /// The request is itself audited; the audit record and the reset commit
    /// together.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not annotate the record or a
    /// write fails.
    pub async fn request_regenerate(
        &self,
        caller: &CallerContext,
        record_id: &str,
        reason: Option<&str>,
    ) -> Result<AuditRecord, DatabaseError> {
        let tenant = self.authorize_record(caller, record_id, Operation::Annotate).await?;

        let detail = RegenerateDetail {
            target_record_id: record_id.to_string(),
            reason: reason.map(str::to_string),
        };
        let mut candidate = RecordCandidate::for_caller(
            caller,
            EVENT_ENRICHMENT_REGENERATED,
            ENTITY_AUDIT_RECORD,
            record_id,
            Severity::Info,
            serde_json::to_value(&detail).map_err(anyhow::Error::from)?,
        );
        candidate.tenant_id.clone_from(&tenant);

        let audit = self
            .db()
            .in_transaction(async {
                let audit = self.append_with_retry(caller, candidate).await?;
                self.db()
                    .execute_with(
                        "UPDATE record_enrichment SET
                            embedding = NULL, embedding_dim = NULL, embedded_at = NULL,
                            anomaly_score = NULL, is_anomaly = NULL, category = NULL, risk_level = NULL,
                            tags = NULL, scored_at = NULL,
                            review_status = NULL, reviewed_by = NULL, reviewed_at = NULL,
                            attempts = 0, last_error = NULL, next_attempt_at = NULL
                         WHERE record_id = ?1",
                        || [record_id],
                    )
                    .await?;
                Ok(audit)
            })
            .await?;
        tracing::info!(record_id, audit_record = %audit.id, "enrichment regenerate requested");
        Ok(audit)
    }

    /// Mark a flagged record as a false positive.
    ///
    /// The only human-writable enrichment mutation. It appends an
    /// `anomaly_reviewed` record, committed together with the review.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidState`] if the record is not flagged
    /// or was already reviewed, or `DatabaseError` on policy or write failure.
    pub async fn review_false_positive(
        &self,
        caller: &CallerContext,
        record_id: &str,
        note: Option<&str>,
    ) -> Result<AuditRecord, DatabaseError> {
        let tenant = self.authorize_record(caller, record_id, Operation::Annotate).await?;

        let mut rows = self
            .db()
            .query_with(
                "SELECT anomaly_score, is_anomaly, review_status FROM record_enrichment WHERE record_id = ?1",
                || [record_id],
            )
            .await?;
        let (score, flagged, reviewed) = match rows.next().await? {
            Some(row) => (
                row.get::<Option<f64>>(0)?,
                row.get::<Option<i64>>(1)? == Some(1),
                get_opt_string(&row, 2)?.is_some(),
            ),
            None => (None, false, false),
        };
        if !flagged {
            return Err(DatabaseError::InvalidState(format!(
                "record {record_id} is not flagged as an anomaly"
            )));
        }
        if reviewed {
            return Err(DatabaseError::InvalidState(format!(
                "record {record_id} was already reviewed"
            )));
        }

        let detail = AnomalyReviewDetail {
            reviewed_record_id: record_id.to_string(),
            anomaly_score: score,
            verdict: ReviewStatus::FalsePositive.as_str().to_string(),
            note: note.map(str::to_string),
        };
        let mut candidate = RecordCandidate::for_caller(
            caller,
            EVENT_ANOMALY_REVIEWED,
            ENTITY_AUDIT_RECORD,
            record_id,
            Severity::Info,
            serde_json::to_value(&detail).map_err(anyhow::Error::from)?,
        );
        candidate.tenant_id.clone_from(&tenant);

        let reviewed_at = ts(&truncate_to_micros(Utc::now()));
        let audit = self
            .db()
            .in_transaction(async {
                let audit = self.append_with_retry(caller, candidate).await?;
                let changed = self
                    .db()
                    .execute_with(
                        "UPDATE record_enrichment
                         SET review_status = ?2, reviewed_by = ?3, reviewed_at = ?4
                         WHERE record_id = ?1 AND is_anomaly = 1 AND review_status IS NULL",
                        || {
                            libsql::params![
                                record_id,
                                ReviewStatus::FalsePositive.as_str(),
                                caller.user_id.as_str(),
                                reviewed_at.as_str()
                            ]
                        },
                    )
                    .await?;
                if changed == 0 {
                    return Err(DatabaseError::InvalidState(format!(
                        "record {record_id} was reviewed concurrently"
                    )));
                }
                Ok(audit)
            })
            .await?;
        tracing::info!(record_id, reviewer = %caller.user_id, "anomaly marked false positive");
        Ok(audit)
    }

    /// Embeddings visible to `caller` under `scan`, with the tenant
    /// predicate and every filter applied in SQL.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not search the scope or the
    /// query fails.
    pub async fn embedded_candidates(
        &self,
        caller: &CallerContext,
        scan: &EmbeddingScan,
    ) -> Result<Vec<EmbeddedCandidate>, DatabaseError> {
        let scope = Self::effective_scope(caller, scan.tenant.as_deref());
        self.authorize(caller, Operation::Search, scope).await?;

        let mut conditions = vec!["e.embedding IS NOT NULL".to_string()];
        let mut params: Vec<libsql::Value> = Vec::new();
        if let Some(ref event_type) = scan.event_type {
            params.push(libsql::Value::Text(event_type.clone()));
            conditions.push(format!("r.event_type = ?{}", params.len()));
        }
        if let Some(severity) = scan.severity {
            params.push(libsql::Value::Text(severity.as_str().to_string()));
            conditions.push(format!("r.severity = ?{}", params.len()));
        }
        if let Some(from) = scan.from {
            params.push(libsql::Value::Text(ts(&from)));
            conditions.push(format!("r.occurred_at >= ?{}", params.len()));
        }
        if let Some(to) = scan.to {
            params.push(libsql::Value::Text(ts(&to)));
            conditions.push(format!("r.occurred_at < ?{}", params.len()));
        }
        if scan.anomalies_only {
            conditions.push("e.is_anomaly = 1".to_string());
        }
        let (tenant_sql, tenant_params) =
            tenant_filter_sql(caller, scope, scan.include_shared, "r.tenant_id", params.len() + 1);
        params.extend(tenant_params);

        let sql = format!(
            "SELECT r.id, r.tenant_id, r.occurred_at, e.embedding
             FROM audit_records r
             JOIN record_enrichment e ON e.record_id = r.id
             WHERE {} {tenant_sql}",
            conditions.join(" AND ")
        );
        let mut rows = self
            .db()
            .query_with(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(EmbeddedCandidate {
                record_id: row.get::<String>(0)?,
                tenant_id: get_opt_string(&row, 1)?,
                occurred_at: parse_datetime(&row.get::<String>(2)?)?,
                embedding: decode_embedding(&row.get::<Vec<u8>>(3)?)?,
            });
        }
        Ok(out)
    }

    // -- internals ----------------------------------------------------------

    async fn authorize_scope(
        &self,
        caller: &CallerContext,
        scope: &EnrichmentScope,
    ) -> Result<(), DatabaseError> {
        if matches!(scope, EnrichmentScope::All) && !caller.is_system {
            return Err(DatabaseError::PolicyDenied {
                operation: Operation::Annotate,
            });
        }
        self.authorize(caller, Operation::Annotate, scope.target()).await
    }

    /// Authorize `operation` on the chain that owns `record_id`.
    ///
    /// Records outside the caller's view are reported as not found. Returns
    /// the owning tenant.
    async fn authorize_record(
        &self,
        caller: &CallerContext,
        record_id: &str,
        operation: Operation,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .db()
            .query_with("SELECT tenant_id FROM audit_records WHERE id = ?1", || [record_id])
            .await?;
        let not_found = || DatabaseError::NotFound {
            entity_type: "audit record",
            id: record_id.to_string(),
        };
        let row = rows.next().await?.ok_or_else(not_found)?;
        let tenant = get_opt_string(&row, 0)?;

        let visible = caller.is_system || tenant.is_none() || tenant.as_deref() == caller.tenant_id();
        if !visible {
            return Err(not_found());
        }
        self.authorize(caller, operation, tenant.as_deref()).await?;
        Ok(tenant)
    }
}
