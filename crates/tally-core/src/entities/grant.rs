use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{ExportDenial, ExportFormat, SecurityLevel};
use crate::identity::CallerContext;

/// A revocable, time-boxed capability to download one export artifact.
///
/// Grant terms never change after creation. The only mutations are the
/// download counter (up) and revocation (one way).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ExportGrant {
    pub token: String,
    pub tenant_id: Option<String>,
    pub created_by: String,
    pub format: ExportFormat,
    pub security_level: SecurityLevel,
    /// The record filter the artifact was generated from.
    pub filter: serde_json::Value,
    pub record_count: u64,
    pub expires_at: DateTime<Utc>,
    /// `None` means any authenticated holder of the token within the tenant.
    pub allowed_users: Option<Vec<String>>,
    /// `None` means unlimited downloads.
    pub download_limit: Option<u32>,
    pub download_count: u32,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExportGrant {
    /// Whether `caller` may learn anything about this grant at all.
    ///
    /// Callers from another tenant get the generic denial for every check.
    #[must_use]
    pub fn is_visible_to(&self, caller: &CallerContext) -> bool {
        caller.is_system || (self.tenant_id.is_some() && self.tenant_id == caller.tenant_id)
    }

    /// Evaluate a download attempt at `now`.
    ///
    /// Checks run in a fixed order and stop at the first failure:
    /// expiry, download limit, revocation, allowlist.
    ///
    /// # Errors
    ///
    /// Returns the [`ExportDenial`] reason of the first failing check.
    pub fn evaluate(&self, caller: &CallerContext, now: DateTime<Utc>) -> Result<(), ExportDenial> {
        if !self.is_visible_to(caller) {
            return Err(ExportDenial::Denied);
        }
        if now >= self.expires_at {
            return Err(ExportDenial::Expired);
        }
        if self
            .download_limit
            .is_some_and(|limit| self.download_count >= limit)
        {
            return Err(ExportDenial::DownloadLimitExceeded);
        }
        if self.revoked {
            return Err(ExportDenial::Revoked);
        }
        let listed = self
            .allowed_users
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|u| u == &caller.user_id));
        if !caller.is_system && !listed {
            return Err(ExportDenial::Denied);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rstest::rstest;

    use super::*;
    use crate::enums::Role;

    fn grant() -> ExportGrant {
        let now = Utc::now();
        ExportGrant {
            token: format!("xgt-{}", "ab".repeat(24)),
            tenant_id: Some("acme".into()),
            created_by: "u-1".into(),
            format: ExportFormat::Json,
            security_level: SecurityLevel::Standard,
            filter: serde_json::json!({}),
            record_count: 3,
            expires_at: now + Duration::hours(1),
            allowed_users: None,
            download_limit: Some(2),
            download_count: 0,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            created_at: now,
        }
    }

    fn acme(user: &str) -> CallerContext {
        CallerContext::tenant("acme", user, Role::Member)
    }

    #[test]
    fn fresh_grant_allows_tenant_member() {
        assert_eq!(grant().evaluate(&acme("u-2"), Utc::now()), Ok(()));
    }

    #[test]
    fn foreign_tenant_gets_generic_denial_even_when_expired() {
        let mut g = grant();
        g.expires_at = Utc::now() - Duration::hours(1);
        let other = CallerContext::tenant("globex", "u-9", Role::Admin);
        assert_eq!(g.evaluate(&other, Utc::now()), Err(ExportDenial::Denied));
    }

    #[rstest]
    #[case::expired_wins_over_everything(true, 2, true, ExportDenial::Expired)]
    #[case::limit_before_revocation(false, 2, true, ExportDenial::DownloadLimitExceeded)]
    #[case::revoked(false, 0, true, ExportDenial::Revoked)]
    fn checks_short_circuit_in_order(
        #[case] expired: bool,
        #[case] downloads: u32,
        #[case] revoked: bool,
        #[case] expected: ExportDenial,
    ) {
        let mut g = grant();
        if expired {
            g.expires_at = Utc::now() - Duration::seconds(1);
        }
        g.download_count = downloads;
        g.revoked = revoked;
        g.allowed_users = Some(vec!["nobody".into()]);
        assert_eq!(g.evaluate(&acme("u-2"), Utc::now()), Err(expected));
    }

    #[test]
    fn allowlist_checked_last() {
        let mut g = grant();
        g.allowed_users = Some(vec!["u-7".into()]);
        assert_eq!(
            g.evaluate(&acme("u-2"), Utc::now()),
            Err(ExportDenial::Denied)
        );
        assert_eq!(g.evaluate(&acme("u-7"), Utc::now()), Ok(()));
    }

    #[test]
    fn unlimited_grant_never_hits_limit() {
        let mut g = grant();
        g.download_limit = None;
        g.download_count = 10_000;
        assert_eq!(g.evaluate(&acme("u-2"), Utc::now()), Ok(()));
    }
}
