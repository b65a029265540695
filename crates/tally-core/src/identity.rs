use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::Role;

/// Principal name recorded for the system identity.
pub const SYSTEM_USER_ID: &str = "system";

/// Authenticated caller context for every trail operation.
///
/// Produced by the external identity provider and trusted as-is: the core
/// never authenticates, it only scopes. Contains only data fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CallerContext {
    /// Tenant the caller is authenticated for. `None` only for the system identity.
    pub tenant_id: Option<String>,
    /// User or service principal ID.
    pub user_id: String,
    /// Role within the tenant.
    pub role: Role,
    /// The platform itself (background workers, migrations, baseline seeding).
    pub is_system: bool,
}

impl CallerContext {
    /// A tenant-scoped caller.
    #[must_use]
    pub fn tenant(tenant_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            user_id: user_id.into(),
            role,
            is_system: false,
        }
    }

    /// The system identity. May write the shared baseline and act across tenants.
    #[must_use]
    pub fn system() -> Self {
        Self {
            tenant_id: None,
            user_id: SYSTEM_USER_ID.to_string(),
            role: Role::Admin,
            is_system: true,
        }
    }

    /// The tenant this caller is scoped to, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Human-readable principal for logs and error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.tenant_id, self.is_system) {
            (_, true) => format!("system:{}", self.user_id),
            (Some(tenant), false) => format!("{tenant}/{}", self.user_id),
            (None, false) => format!("unscoped/{}", self.user_id),
        }
    }
}
