//! Export/retention controller.
//!
//! An export renders the caller-visible records matching a filter into an
//! immutable artifact and issues an [`ExportGrant`] for it. Every download
//! attempt is evaluated against the grant (expiry, download limit,
//! revocation, allowlist, in that order) and counted with a single
//! conditional `UPDATE`, so the check and the increment cannot race.
//!
//! Callers who may not know a token exists (malformed, unknown, or another
//! tenant's) all get the same [`ExportDenial::Denied`].

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_jsonlines::JsonLinesWriter;
use tally_core::chain::{canonical_json_string, sha256_hex, truncate_to_micros};
use tally_core::entities::{AuditRecord, ExportGrant};
use tally_core::enums::{AccessAction, AccessOutcome, ExportDenial, ExportFormat, Operation, SecurityLevel};
use tally_core::identity::CallerContext;
use tally_core::ids::is_well_formed_token;

use crate::error::DatabaseError;
use crate::helpers::{
    get_opt_string, parse_datetime, parse_enum, parse_json, parse_optional_datetime,
    parse_string_list, string_list_json, to_u32, to_u64, ts,
};
use crate::repos::records::RecordFilter;
use crate::service::TallyService;

const GRANT_SELECT: &str = "SELECT token, tenant_id, created_by, format, security_level, filter, record_count,
        expires_at, allowed_users, download_limit, download_count, revoked, revoked_at, revoked_reason, created_at
     FROM export_grants";

/// Reason recorded on grants revoked by [`TallyService::sweep_expired`].
pub const EXPIRED_REASON: &str = "expired";

const CSV_HEADER: [&str; 13] = [
    "id",
    "tenant_id",
    "seq",
    "event_type",
    "entity_type",
    "entity_id",
    "severity",
    "actor_id",
    "occurred_at",
    "action_details",
    "content_hash",
    "prev_hash",
    "chain_hash",
];

/// Parameters for [`TallyService::create_export`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub filter: RecordFilter,
    pub format: ExportFormat,
    pub security_level: SecurityLevel,
    /// Defaults to `export.default_ttl_secs`; may not exceed `export.max_ttl_secs`.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub allowed_users: Option<Vec<String>>,
    /// Defaults to `export.default_download_limit`.
    #[serde(default)]
    pub download_limit: Option<u32>,
}

impl ExportRequest {
    #[must_use]
    pub fn new(filter: RecordFilter, format: ExportFormat) -> Self {
        Self {
            filter,
            format,
            security_level: SecurityLevel::Standard,
            ttl_secs: None,
            allowed_users: None,
            download_limit: None,
        }
    }
}

/// A successful download: the counted grant and the artifact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDownload {
    pub grant: ExportGrant,
    pub content: Vec<u8>,
    pub content_type: String,
    pub sha256: String,
}

fn grant_from_row(row: &libsql::Row) -> Result<ExportGrant, DatabaseError> {
    Ok(ExportGrant {
        token: row.get::<String>(0)?,
        tenant_id: get_opt_string(row, 1)?,
        created_by: row.get::<String>(2)?,
        format: parse_enum(&row.get::<String>(3)?)?,
        security_level: parse_enum(&row.get::<String>(4)?)?,
        filter: parse_json(&row.get::<String>(5)?)?,
        record_count: to_u64(row.get::<i64>(6)?, "record_count")?,
        expires_at: parse_datetime(&row.get::<String>(7)?)?,
        allowed_users: parse_string_list(get_opt_string(row, 8)?.as_deref())?,
        download_limit: row
            .get::<Option<i64>>(9)?
            .map(|v| to_u32(v, "download_limit"))
            .transpose()?,
        download_count: to_u32(row.get::<i64>(10)?, "download_count")?,
        revoked: row.get::<i64>(11)? != 0,
        revoked_at: parse_optional_datetime(get_opt_string(row, 12)?.as_deref())?,
        revoked_reason: get_opt_string(row, 13)?,
        created_at: parse_datetime(&row.get::<String>(14)?)?,
    })
}

/// Render records into artifact bytes.
///
/// # Errors
///
/// Returns `DatabaseError` if serialization fails.
pub fn render_artifact(records: &[AuditRecord], format: ExportFormat) -> Result<Vec<u8>, DatabaseError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(records).map_err(anyhow::Error::from)?),
        ExportFormat::Jsonl => {
            let mut writer = JsonLinesWriter::new(Vec::new());
            writer.write_all(records).map_err(anyhow::Error::from)?;
            Ok(writer.into_inner())
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(CSV_HEADER).map_err(anyhow::Error::from)?;
            for r in records {
                let details = canonical_json_string(&r.action_details)?;
                let seq = r.seq.to_string();
                let occurred_at = ts(&r.occurred_at);
                writer
                    .write_record([
                        r.id.as_str(),
                        r.tenant_id.as_deref().unwrap_or(""),
                        seq.as_str(),
                        r.event_type.as_str(),
                        r.entity_type.as_str(),
                        r.entity_id.as_str(),
                        r.severity.as_str(),
                        r.actor_id.as_deref().unwrap_or(""),
                        occurred_at.as_str(),
                        details.as_str(),
                        r.content_hash.as_str(),
                        r.prev_hash.as_str(),
                        r.chain_hash.as_str(),
                    ])
                    .map_err(anyhow::Error::from)?;
            }
            writer
                .into_inner()
                .map_err(|e| DatabaseError::Other(anyhow::anyhow!("csv flush: {e}")))
        }
    }
}

impl TallyService {
    /// Render an export of the caller-visible records matching the request
    /// and issue a grant for it.
    ///
    /// # Errors
    ///
    /// - [`DatabaseError::PolicyDenied`] if the caller's role may not create
    ///   exports at the requested security level.
    /// - [`DatabaseError::TenantScopeViolation`] for another tenant's records.
    /// - [`DatabaseError::MalformedCandidate`] for invalid terms (TTL out of
    ///   range, zero download limit, restricted export without allowlist).
    pub async fn create_export(
        &self,
        caller: &CallerContext,
        request: ExportRequest,
    ) -> Result<ExportGrant, DatabaseError> {
        let scope = Self::effective_scope(caller, request.filter.tenant.as_deref()).map(str::to_string);
        self.authorize(caller, Operation::Export, scope.as_deref()).await?;

        let level = request.security_level;
        if level.requires_oversight_role() && !caller.is_system && !caller.role.is_oversight() {
            return Err(DatabaseError::PolicyDenied {
                operation: Operation::Export,
            });
        }
        let allowed_users = request.allowed_users.filter(|users| !users.is_empty());
        if level.requires_allowlist() && allowed_users.is_none() {
            return Err(DatabaseError::MalformedCandidate(
                "restricted exports require a non-empty allowlist".into(),
            ));
        }

        let cfg = &self.config().export;
        let ttl = request.ttl_secs.unwrap_or(cfg.default_ttl_secs);
        if ttl == 0 || ttl > cfg.max_ttl_secs {
            return Err(DatabaseError::MalformedCandidate(format!(
                "ttl {ttl}s outside 1..={}s",
                cfg.max_ttl_secs
            )));
        }
        let download_limit = request.download_limit.or(cfg.default_download_limit);
        if download_limit == Some(0) {
            return Err(DatabaseError::MalformedCandidate(
                "download limit must be positive".into(),
            ));
        }

        let mut filter = request.filter;
        filter.tenant.clone_from(&scope);
        let cap = cfg.artifact_max_records;
        filter.limit = Some(filter.limit.map_or(cap, |l| l.min(cap)));
        let records = self.select_records(caller, &filter).await?;
        let content = render_artifact(&records, request.format)?;
        let sha256 = sha256_hex(&content);

        let now = truncate_to_micros(Utc::now());
        let expires_at = now + Duration::seconds(i64::try_from(ttl).map_err(anyhow::Error::from)?);
        let grant = ExportGrant {
            token: self.db().generate_token().await?,
            tenant_id: scope,
            created_by: caller.user_id.clone(),
            format: request.format,
            security_level: level,
            filter: serde_json::to_value(&filter).map_err(anyhow::Error::from)?,
            record_count: records.len() as u64,
            expires_at,
            allowed_users,
            download_limit,
            download_count: 0,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            created_at: now,
        };
        self.store_grant(&grant, &content, &sha256).await?;

        self.log_access(
            caller,
            AccessAction::ExportCreate,
            Some(grant.token.as_str()),
            Some(serde_json::json!({
                "format": grant.format.as_str(),
                "security_level": level.as_str(),
                "record_count": grant.record_count,
                "sha256": sha256,
            })),
            AccessOutcome::Allowed,
            false,
        )
        .await?;

        tracing::info!(
            tenant = ?grant.tenant_id,
            records = grant.record_count,
            format = %grant.format,
            security_level = %level,
            "export grant issued"
        );
        Ok(grant)
    }

    /// Whether `caller` could download with `token` right now.
    ///
    /// Pure check; nothing is counted or logged.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` only if the lookup fails.
    pub async fn check_access(&self, caller: &CallerContext, token: &str) -> Result<bool, DatabaseError> {
        match self.evaluate_access(caller, token).await {
            Ok(_) => Ok(true),
            Err(DatabaseError::ExportDenied(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Evaluate a download attempt without counting it.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ExportDenied`] with the first failing check.
    pub async fn evaluate_access(
        &self,
        caller: &CallerContext,
        token: &str,
    ) -> Result<ExportGrant, DatabaseError> {
        let grant = self
            .visible_grant(caller, token)
            .await?
            .ok_or(DatabaseError::ExportDenied(ExportDenial::Denied))?;
        grant
            .evaluate(caller, Utc::now())
            .map_err(DatabaseError::ExportDenied)?;
        Ok(grant)
    }

    /// Count one download against the grant, only if access is allowed at
    /// the moment of the increment. Every attempt is meta-audited.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ExportDenied`] with the reason the attempt
    /// was refused.
    pub async fn record_download(
        &self,
        caller: &CallerContext,
        token: &str,
    ) -> Result<ExportGrant, DatabaseError> {
        let counted = self.try_count_download(caller, token).await;
        let target = is_well_formed_token(token).then_some(token);
        match counted {
            Ok(grant) => {
                self.log_access(
                    caller,
                    AccessAction::ExportDownload,
                    target,
                    Some(serde_json::json!({ "download_count": grant.download_count })),
                    AccessOutcome::Allowed,
                    false,
                )
                .await?;
                Ok(grant)
            }
            Err(DatabaseError::ExportDenied(reason)) => {
                self.log_access(
                    caller,
                    AccessAction::ExportDownload,
                    target,
                    Some(serde_json::json!({ "reason": reason.as_str() })),
                    AccessOutcome::Denied,
                    false,
                )
                .await?;
                tracing::info!(caller = %caller.describe(), reason = %reason, "export download denied");
                Err(DatabaseError::ExportDenied(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Count a download and return the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ExportDenied`] if access is refused.
    pub async fn download(
        &self,
        caller: &CallerContext,
        token: &str,
    ) -> Result<ExportDownload, DatabaseError> {
        let grant = self.record_download(caller, token).await?;
        let mut rows = self
            .db()
            .query_with(
                "SELECT content, content_type, sha256 FROM export_artifacts WHERE token = ?1",
                || [token],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| DatabaseError::NotFound {
            entity_type: "export artifact",
            id: grant.token.clone(),
        })?;
        Ok(ExportDownload {
            content: row.get::<Vec<u8>>(0)?,
            content_type: row.get::<String>(1)?,
            sha256: row.get::<String>(2)?,
            grant,
        })
    }

    /// Look up a grant's terms and state.
    ///
    /// # Errors
    ///
    /// Returns the generic [`ExportDenial::Denied`] for tokens the caller may
    /// not see.
    pub async fn get_grant(&self, caller: &CallerContext, token: &str) -> Result<ExportGrant, DatabaseError> {
        self.visible_grant(caller, token)
            .await?
            .ok_or(DatabaseError::ExportDenied(ExportDenial::Denied))
    }

    /// Revoke a grant. Only its creator, tenant oversight roles, or the
    /// system identity may revoke. Revoking a revoked grant is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the generic denial for invisible tokens and
    /// [`DatabaseError::PolicyDenied`] for other callers.
    pub async fn revoke(
        &self,
        caller: &CallerContext,
        token: &str,
        reason: &str,
    ) -> Result<ExportGrant, DatabaseError> {
        let grant = self.get_grant(caller, token).await?;
        let entitled = caller.is_system || caller.role.is_oversight() || grant.created_by == caller.user_id;
        if !entitled {
            return Err(DatabaseError::PolicyDenied {
                operation: Operation::Export,
            });
        }
        if grant.revoked {
            return Ok(grant);
        }

        let now = ts(&truncate_to_micros(Utc::now()));
        self.db()
            .execute_with(
                "UPDATE export_grants SET revoked = 1, revoked_at = ?2, revoked_reason = ?3
                 WHERE token = ?1 AND revoked = 0",
                || libsql::params![token, now.as_str(), reason],
            )
            .await?;
        self.log_access(
            caller,
            AccessAction::ExportRevoke,
            Some(token),
            Some(serde_json::json!({ "reason": reason })),
            AccessOutcome::Allowed,
            false,
        )
        .await?;
        tracing::info!(caller = %caller.describe(), reason, "export grant revoked");

        self.get_grant(caller, token).await
    }

    /// Revoke every active grant whose expiry has passed, with reason
    /// `"expired"`. Non-system callers sweep only their own tenant.
    ///
    /// Returns the number of grants revoked.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not manage exports or the
    /// update fails.
    pub async fn sweep_expired(&self, caller: &CallerContext) -> Result<u64, DatabaseError> {
        let scope = Self::effective_scope(caller, None);
        self.authorize(caller, Operation::Export, scope).await?;

        let now = ts(&truncate_to_micros(Utc::now()));
        let swept = match scope {
            Some(tenant) => {
                self.db()
                    .execute_with(
                        "UPDATE export_grants SET revoked = 1, revoked_at = ?1, revoked_reason = ?2
                         WHERE revoked = 0 AND expires_at <= ?1 AND tenant_id = ?3",
                        || libsql::params![now.as_str(), EXPIRED_REASON, tenant],
                    )
                    .await?
            }
            None => {
                self.db()
                    .execute_with(
                        "UPDATE export_grants SET revoked = 1, revoked_at = ?1, revoked_reason = ?2
                         WHERE revoked = 0 AND expires_at <= ?1",
                        || libsql::params![now.as_str(), EXPIRED_REASON],
                    )
                    .await?
            }
        };

        if swept > 0 {
            tracing::info!(tenant = ?scope, swept, "expired export grants revoked");
        }
        Ok(swept)
    }

    // -- internals ----------------------------------------------------------

    /// Load a grant the caller is entitled to know about.
    ///
    /// Malformed, unknown, and foreign tokens are indistinguishable (`None`).
    /// Foreign tokens are additionally flagged as a security event.
    async fn visible_grant(
        &self,
        caller: &CallerContext,
        token: &str,
    ) -> Result<Option<ExportGrant>, DatabaseError> {
        if !is_well_formed_token(token) {
            return Ok(None);
        }
        let Some(grant) = self.load_grant(token).await? else {
            return Ok(None);
        };
        if grant.is_visible_to(caller) {
            return Ok(Some(grant));
        }

        tracing::warn!(
            security_event = true,
            caller = %caller.describe(),
            "export token presented outside its tenant"
        );
        self.log_access(
            caller,
            AccessAction::ScopeViolation,
            grant.tenant_id.as_deref(),
            Some(serde_json::json!({ "operation": Operation::Export.as_str() })),
            AccessOutcome::Denied,
            true,
        )
        .await?;
        Ok(None)
    }

    async fn load_grant(&self, token: &str) -> Result<Option<ExportGrant>, DatabaseError> {
        let sql = format!("{GRANT_SELECT} WHERE token = ?1");
        let mut rows = self.db().query_with(&sql, || [token]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(grant_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn try_count_download(
        &self,
        caller: &CallerContext,
        token: &str,
    ) -> Result<ExportGrant, DatabaseError> {
        let grant = self.evaluate_access(caller, token).await?;

        // Re-checks expiry, limit, and revocation at the moment of increment.
        let now = ts(&Utc::now());
        let changed = self
            .db()
            .execute_with(
                "UPDATE export_grants SET download_count = download_count + 1
                 WHERE token = ?1 AND revoked = 0 AND expires_at > ?2
                   AND (download_limit IS NULL OR download_count < download_limit)",
                || libsql::params![token, now.as_str()],
            )
            .await?;

        if changed == 0 {
            // Lost a race: report whatever now blocks access.
            let current = self.evaluate_access(caller, token).await.err();
            return Err(current.unwrap_or(DatabaseError::ExportDenied(ExportDenial::Denied)));
        }

        Ok(ExportGrant {
            download_count: grant.download_count + 1,
            ..grant
        })
    }

    async fn store_grant(&self, grant: &ExportGrant, content: &[u8], sha256: &str) -> Result<(), DatabaseError> {
        let filter = serde_json::to_string(&grant.filter).map_err(anyhow::Error::from)?;
        let allowed = string_list_json(grant.allowed_users.as_deref())?;
        let byte_len = i64::try_from(content.len()).map_err(anyhow::Error::from)?;
        let record_count = i64::try_from(grant.record_count).map_err(anyhow::Error::from)?;

        self.db()
            .in_transaction(async {
                self.db()
                    .execute_with(
                        "INSERT INTO export_grants (token, tenant_id, created_by, format, security_level, filter,
                            record_count, expires_at, allowed_users, download_limit, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        || {
                            libsql::params![
                                grant.token.as_str(),
                                grant.tenant_id.as_deref(),
                                grant.created_by.as_str(),
                                grant.format.as_str(),
                                grant.security_level.as_str(),
                                filter.as_str(),
                                record_count,
                                ts(&grant.expires_at),
                                allowed.as_deref(),
                                grant.download_limit.map(i64::from),
                                ts(&grant.created_at)
                            ]
                        },
                    )
                    .await?;
                self.db()
                    .execute_with(
                        "INSERT INTO export_artifacts (token, content, content_type, byte_len, sha256)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        || {
                            libsql::params![
                                grant.token.as_str(),
                                content.to_vec(),
                                grant.format.content_type(),
                                byte_len,
                                sha256
                            ]
                        },
                    )
                    .await?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tally_core::enums::Role;

    use super::*;
    use crate::test_support::helpers::{append_n, auditor, member, test_service};

    fn request(limit: Option<u32>) -> ExportRequest {
        ExportRequest {
            download_limit: limit,
            ..ExportRequest::new(RecordFilter::default(), ExportFormat::Json)
        }
    }

    #[tokio::test]
    async fn export_contains_only_caller_tenant() {
        let svc = test_service().await;
        let acme = member("acme");
        append_n(&svc, &acme, 3).await;
        append_n(&svc, &member("globex"), 2).await;

        let grant = svc.create_export(&acme, request(None)).await.unwrap();
        assert_eq!(grant.record_count, 3);
        assert_eq!(grant.tenant_id.as_deref(), Some("acme"));

        let download = svc.download(&acme, &grant.token).await.unwrap();
        assert_eq!(download.sha256, sha256_hex(&download.content));
        let records: Vec<AuditRecord> = serde_json::from_slice(&download.content).unwrap();
        assert!(records.iter().all(|r| r.tenant_id.as_deref() == Some("acme")));
    }

    #[tokio::test]
    async fn limit_is_never_exceeded() {
        let svc = test_service().await;
        let acme = member("acme");
        append_n(&svc, &acme, 1).await;
        let grant = svc.create_export(&acme, request(Some(2))).await.unwrap();

        svc.download(&acme, &grant.token).await.unwrap();
        let second = svc.download(&acme, &grant.token).await.unwrap();
        assert_eq!(second.grant.download_count, 2);

        let err = svc.download(&acme, &grant.token).await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::ExportDenied(ExportDenial::DownloadLimitExceeded)
        ));
        assert_eq!(svc.get_grant(&acme, &grant.token).await.unwrap().download_count, 2);
    }

    #[tokio::test]
    async fn revoked_grant_stays_revoked() {
        let svc = test_service().await;
        let acme = member("acme");
        let grant = svc.create_export(&acme, request(None)).await.unwrap();
        assert!(svc.check_access(&acme, &grant.token).await.unwrap());

        let revoked = svc.revoke(&acme, &grant.token, "shared by mistake").await.unwrap();
        assert!(revoked.revoked);
        assert_eq!(revoked.revoked_reason.as_deref(), Some("shared by mistake"));

        let again = svc.revoke(&acme, &grant.token, "other").await.unwrap();
        assert_eq!(again.revoked_reason.as_deref(), Some("shared by mistake"));
        assert!(!svc.check_access(&acme, &grant.token).await.unwrap());
        assert!(matches!(
            svc.download(&acme, &grant.token).await.unwrap_err(),
            DatabaseError::ExportDenied(ExportDenial::Revoked)
        ));
    }

    #[tokio::test]
    async fn malformed_unknown_and_foreign_tokens_look_alike() {
        let svc = test_service().await;
        let grant = svc.create_export(&member("globex"), request(None)).await.unwrap();
        let acme = member("acme");
        let unknown = format!("xgt-{}", "0".repeat(48));

        for token in ["not-a-token", unknown.as_str(), grant.token.as_str()] {
            let err = svc.download(&acme, token).await.unwrap_err();
            assert!(matches!(err, DatabaseError::ExportDenied(ExportDenial::Denied)), "{token}");
        }
    }

    #[tokio::test]
    async fn restricted_requires_allowlist_and_oversight() {
        let svc = test_service().await;
        let mut req = request(None);
        req.security_level = SecurityLevel::Restricted;

        let err = svc.create_export(&member("acme"), req.clone()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::PolicyDenied { .. }));

        let err = svc.create_export(&auditor("acme"), req.clone()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedCandidate(_)));

        req.allowed_users = Some(vec!["acme-member".into()]);
        let grant = svc.create_export(&auditor("acme"), req).await.unwrap();
        assert!(svc.check_access(&member("acme"), &grant.token).await.unwrap());
        let outsider = CallerContext::tenant("acme", "u-77", Role::Admin);
        assert!(!svc.check_access(&outsider, &grant.token).await.unwrap());
    }

    #[tokio::test]
    async fn ttl_bounded_by_config() {
        let svc = test_service().await;
        let mut req = request(None);
        req.ttl_secs = Some(svc.config().export.max_ttl_secs + 1);
        let err = svc.create_export(&member("acme"), req).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedCandidate(_)));
    }

    #[tokio::test]
    async fn viewer_cannot_export() {
        let svc = test_service().await;
        let viewer = CallerContext::tenant("acme", "v-1", Role::Viewer);
        let err = svc.create_export(&viewer, request(None)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::PolicyDenied { .. }));
    }

    #[tokio::test]
    async fn csv_artifact_has_header_and_rows() {
        let svc = test_service().await;
        let acme = member("acme");
        append_n(&svc, &acme, 2).await;
        let mut req = request(None);
        req.format = ExportFormat::Csv;
        let grant = svc.create_export(&acme, req).await.unwrap();
        let download = svc.download(&acme, &grant.token).await.unwrap();

        assert_eq!(download.content_type, "text/csv");
        let mut reader = csv::Reader::from_reader(download.content.as_slice());
        assert_eq!(reader.headers().unwrap().len(), CSV_HEADER.len());
        assert_eq!(reader.records().count(), 2);
    }

    #[tokio::test]
    async fn jsonl_artifact_has_one_line_per_record() {
        let svc = test_service().await;
        let acme = member("acme");
        append_n(&svc, &acme, 3).await;
        let mut req = request(None);
        req.format = ExportFormat::Jsonl;
        let grant = svc.create_export(&acme, req).await.unwrap();
        let download = svc.download(&acme, &grant.token).await.unwrap();

        let text = String::from_utf8(download.content).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
