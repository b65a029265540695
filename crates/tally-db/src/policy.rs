//! Access Policy Layer.
//!
//! Every store and index operation asks [`AccessPolicy::allow`] first. The
//! default [`TenantPolicy`] admits a caller when the target tenant is its own,
//! when the target is the shared baseline and the operation only reads, or
//! when the caller is the system identity. Updates and deletes of audit
//! records are refused for everyone but the system identity, and the store
//! itself refuses them unconditionally.

use tally_core::enums::{AccessAction, AccessOutcome, Operation};
use tally_core::identity::CallerContext;

use crate::error::DatabaseError;
use crate::service::TallyService;

/// Decision function consulted before every trail operation.
pub trait AccessPolicy: Send + Sync {
    /// `target_tenant = None` addresses the shared baseline.
    fn allow(&self, caller: &CallerContext, operation: Operation, target_tenant: Option<&str>) -> bool;
}

/// Tenant isolation plus role gates.
///
/// Viewers read, search, and verify. Members also write and export at the
/// standard security level. Auditors and admins also annotate and inspect
/// the access log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantPolicy;

impl TenantPolicy {
    const fn role_permits(caller: &CallerContext, operation: Operation) -> bool {
        match operation {
            Operation::Read | Operation::Search | Operation::Verify => true,
            Operation::Write | Operation::Export => caller.role.can_write(),
            Operation::Annotate | Operation::InspectAccessLog => caller.role.is_oversight(),
            Operation::Update | Operation::Delete => false,
        }
    }
}

impl AccessPolicy for TenantPolicy {
    fn allow(&self, caller: &CallerContext, operation: Operation, target_tenant: Option<&str>) -> bool {
        if caller.is_system {
            return true;
        }
        if !Self::role_permits(caller, operation) {
            return false;
        }
        match target_tenant {
            Some(target) => caller.tenant_id() == Some(target),
            None => operation.is_read_only(),
        }
    }
}

/// Build the SQL tenant predicate for reads.
///
/// Returns `AND (...)` plus its parameters, numbered from `start_param`.
/// The predicate runs inside the storage engine's `WHERE`, before any
/// ordering or limit, so filtered-out tenants never compete for result slots.
///
/// - `scope = Some(t)` restricts to tenant `t` (and the shared baseline when
///   `include_shared`).
/// - `scope = None` for the system identity means every chain.
/// - `scope = None` for anyone else means the shared baseline only.
pub(crate) fn tenant_filter_sql(
    caller: &CallerContext,
    scope: Option<&str>,
    include_shared: bool,
    column: &str,
    start_param: usize,
) -> (String, Vec<libsql::Value>) {
    match scope {
        Some(tenant) => {
            let shared = if include_shared {
                format!(" OR {column} IS NULL")
            } else {
                String::new()
            };
            (
                format!("AND ({column} = ?{start_param}{shared})"),
                vec![libsql::Value::Text(tenant.to_string())],
            )
        }
        None if caller.is_system => (String::new(), vec![]),
        None => (format!("AND {column} IS NULL"), vec![]),
    }
}

impl TallyService {
    /// Resolve which tenant a read should be scoped to.
    ///
    /// An explicit tenant wins; otherwise non-system callers default to their
    /// own tenant.
    #[must_use]
    pub fn effective_scope<'a>(
        caller: &'a CallerContext,
        requested: Option<&'a str>,
    ) -> Option<&'a str> {
        requested.or_else(|| {
            if caller.is_system {
                None
            } else {
                caller.tenant_id()
            }
        })
    }

    /// Consult the policy and turn a refusal into a typed error.
    ///
    /// A refusal that crosses into another concrete tenant (or a non-system
    /// write aimed at the shared baseline) is a tenant-scope violation: it is
    /// logged as a security event and recorded in the access log before the
    /// error surfaces. Anything else is a plain role denial.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TenantScopeViolation`] or
    /// [`DatabaseError::PolicyDenied`].
    pub async fn authorize(
        &self,
        caller: &CallerContext,
        operation: Operation,
        target_tenant: Option<&str>,
    ) -> Result<(), DatabaseError> {
        if self.policy().allow(caller, operation, target_tenant) {
            return Ok(());
        }

        let crosses_tenant = !caller.is_system
            && target_tenant != caller.tenant_id()
            && (target_tenant.is_some() || !operation.is_read_only());
        if !crosses_tenant {
            return Err(DatabaseError::PolicyDenied { operation });
        }

        let target = target_tenant.unwrap_or("<shared>").to_string();
        tracing::warn!(
            security_event = true,
            caller = %caller.describe(),
            target_tenant = %target,
            operation = %operation,
            "tenant scope violation"
        );
        self.log_access(
            caller,
            AccessAction::ScopeViolation,
            Some(target.as_str()),
            Some(serde_json::json!({ "operation": operation.as_str() })),
            AccessOutcome::Denied,
            true,
        )
        .await?;

        Err(DatabaseError::TenantScopeViolation {
            caller: caller.describe(),
            target,
        })
    }
}
