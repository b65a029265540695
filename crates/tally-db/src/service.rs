//! Service layer wrapping the database with policy, hooks, and configuration.
//!
//! `TallyService` is the single entry point to the trail. All repo methods
//! are implemented as `impl TallyService` in `repos/*` and pass through
//! [`TallyService::authorize`] before touching storage.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tally_config::TallyConfig;

use crate::TallyDb;
use crate::error::DatabaseError;
use crate::hooks::AuditHooks;
use crate::policy::{AccessPolicy, TenantPolicy};
use crate::retry::RetryConfig;

/// Audit trail engine bound to one database.
///
/// Share it between tasks behind an `Arc`: each transactional write runs on
/// its own connection. Separate processes open their own service; chain
/// continuity never depends on state shared between them. The per-row
/// audit hooks are process-wide and can be shared with [`Self::with_hooks`].
pub struct TallyService {
    db: TallyDb,
    hooks: Arc<AuditHooks>,
    policy: Arc<dyn AccessPolicy>,
    config: TallyConfig,
}

impl TallyService {
    /// Open the database named by `config.database` and wrap it.
    ///
    /// Creates the parent directory of an on-disk database if needed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the directory cannot be created, the
    /// database cannot be opened, or migrations fail.
    pub async fn open(config: TallyConfig) -> Result<Self, DatabaseError> {
        let parent = Path::new(&config.database.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty() && !config.database.is_in_memory());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Other(anyhow::anyhow!(
                    "creating database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let db = TallyDb::open_local_with_timeout(
            &config.database.path,
            Duration::from_millis(config.database.busy_timeout_ms),
        )
        .await?;
        Ok(Self::from_db(db, config))
    }

    /// Wrap an existing `TallyDb` with the default policy and fresh hooks.
    #[must_use]
    pub fn from_db(db: TallyDb, config: TallyConfig) -> Self {
        Self {
            db,
            hooks: AuditHooks::new(),
            policy: Arc::new(TenantPolicy),
            config,
        }
    }

    /// Replace the access policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Share audit hooks with other services in this process.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<AuditHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &TallyDb {
        &self.db
    }

    #[must_use]
    pub const fn hooks(&self) -> &Arc<AuditHooks> {
        &self.hooks
    }

    #[must_use]
    pub fn policy(&self) -> &dyn AccessPolicy {
        self.policy.as_ref()
    }

    #[must_use]
    pub const fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Backoff used by [`Self::append_with_retry`].
    #[must_use]
    pub fn chain_retry(&self) -> RetryConfig {
        RetryConfig::from(&self.config.chain)
    }
}
