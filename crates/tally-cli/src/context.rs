use std::sync::Arc;

use anyhow::{Context, bail};
use tally_config::TallyConfig;
use tally_core::enums::Role;
use tally_core::identity::CallerContext;
use tally_db::service::TallyService;
use tally_embeddings::{EmbeddingEngine, Embedder, HashingEmbedder};

use crate::cli::{EmbedderKind, IdentityFlags};
use crate::commands::shared::parse::parse_enum;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub service: Arc<TallyService>,
    pub config: TallyConfig,
    pub caller: CallerContext,
}

impl AppContext {
    /// Open the trail and resolve the caller identity.
    pub async fn init(config: TallyConfig, identity: &IdentityFlags) -> anyhow::Result<Self> {
        let caller = resolve_caller(identity)?;
        let service = TallyService::open(config.clone())
            .await
            .with_context(|| format!("failed to open tally database at {}", config.database.path))?;
        tracing::debug!(caller = %caller.describe(), "application context ready");
        Ok(Self {
            service: Arc::new(service),
            config,
            caller,
        })
    }

    /// Build the embedder selected on the command line.
    pub fn embedder(kind: EmbedderKind) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match kind {
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
            EmbedderKind::Fastembed => {
                Arc::new(EmbeddingEngine::new().context("failed to initialize fastembed model")?)
            }
        };
        Ok(embedder)
    }
}

/// Translate identity flags into a caller context.
///
/// Authentication happens upstream; the CLI only carries what the identity
/// provider asserted.
pub fn resolve_caller(identity: &IdentityFlags) -> anyhow::Result<CallerContext> {
    if identity.system {
        return Ok(CallerContext::system());
    }
    let Some(tenant) = identity.tenant.as_deref() else {
        bail!("no caller identity: pass --tenant and --user, or --system");
    };
    let Some(user) = identity.user.as_deref() else {
        bail!("--user is required with --tenant");
    };
    let role = identity
        .role
        .as_deref()
        .map(|raw| parse_enum::<Role>(raw, "role"))
        .transpose()?
        .unwrap_or(Role::Member);
    Ok(CallerContext::tenant(tenant, user, role))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn flags(tenant: Option<&str>, user: Option<&str>, role: Option<&str>) -> IdentityFlags {
        IdentityFlags {
            tenant: tenant.map(String::from),
            user: user.map(String::from),
            role: role.map(String::from),
            system: false,
        }
    }

    #[test]
    fn tenant_caller_defaults_to_member() {
        let caller = resolve_caller(&flags(Some("acme"), Some("u-1"), None)).unwrap();
        assert_eq!(caller, CallerContext::tenant("acme", "u-1", Role::Member));
    }

    #[test]
    fn role_is_parsed() {
        let caller = resolve_caller(&flags(Some("acme"), Some("u-1"), Some("auditor"))).unwrap();
        assert_eq!(caller.role, Role::Auditor);
    }

    #[test]
    fn system_flag_wins() {
        let identity = IdentityFlags {
            system: true,
            ..IdentityFlags::default()
        };
        assert!(resolve_caller(&identity).unwrap().is_system);
    }

    #[test]
    fn missing_identity_is_an_error() {
        let err = resolve_caller(&flags(None, Some("u-1"), None)).unwrap_err();
        assert!(err.to_string().contains("no caller identity"));
        assert!(resolve_caller(&flags(Some("acme"), None, None)).is_err());
        assert!(resolve_caller(&flags(Some("acme"), Some("u-1"), Some("root"))).is_err());
    }
}
