//! Per-row audit hooks for tracked entity collections.
//!
//! Every `upsert_entity` appends an `entity_upserted` audit record unless the
//! hook for that entity kind is suspended. Suspension is only available as a
//! scoped guard: the hook comes back when the last [`HookSuspension`] for the
//! kind is dropped, whether the holder returned, failed, panicked, or was
//! cancelled mid-await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Suspension counters per entity kind.
///
/// Shared (`Arc`) by every service in the process that writes the same
/// collections.
#[derive(Debug, Default)]
pub struct AuditHooks {
    suspended: Mutex<HashMap<String, usize>>,
}

impl AuditHooks {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Suspend the per-row hook for `kind` until the returned guard drops.
    ///
    /// Suspensions nest: two overlapping bulk imports of the same kind keep
    /// the hook off until both guards are gone.
    #[must_use = "the hook is re-enabled as soon as the guard is dropped"]
    pub fn suspend(self: &Arc<Self>, kind: &str) -> HookSuspension {
        let mut map = self.suspended.lock().unwrap_or_else(PoisonError::into_inner);
        *map.entry(kind.to_string()).or_insert(0) += 1;
        tracing::debug!(entity_kind = kind, "per-row audit hook suspended");
        HookSuspension {
            hooks: Arc::clone(self),
            kind: kind.to_string(),
        }
    }

    /// Whether upserts of `kind` currently produce per-row audit records.
    #[must_use]
    pub fn is_active(&self, kind: &str) -> bool {
        let map = self.suspended.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(kind).is_none_or(|count| *count == 0)
    }

    fn release(&self, kind: &str) {
        let mut map = self.suspended.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = map.get_mut(kind) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(kind);
                tracing::debug!(entity_kind = kind, "per-row audit hook re-enabled");
            }
        }
    }
}

/// Scoped suspension of one entity kind's audit hook.
#[derive(Debug)]
pub struct HookSuspension {
    hooks: Arc<AuditHooks>,
    kind: String,
}

impl HookSuspension {
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl Drop for HookSuspension {
    fn drop(&mut self) {
        self.hooks.release(&self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_start_active() {
        let hooks = AuditHooks::new();
        assert!(hooks.is_active("project"));
    }

    #[test]
    fn guard_suspends_only_its_kind() {
        let hooks = AuditHooks::new();
        let guard = hooks.suspend("project");
        assert!(!hooks.is_active("project"));
        assert!(hooks.is_active("resource"));
        drop(guard);
        assert!(hooks.is_active("project"));
    }

    #[test]
    fn nested_suspensions_release_on_last_drop() {
        let hooks = AuditHooks::new();
        let outer = hooks.suspend("project");
        let inner = hooks.suspend("project");
        drop(outer);
        assert!(!hooks.is_active("project"));
        drop(inner);
        assert!(hooks.is_active("project"));
    }

    #[test]
    fn guard_released_on_panic() {
        let hooks = AuditHooks::new();
        let cloned = Arc::clone(&hooks);
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.suspend("project");
            panic!("import blew up");
        });
        assert!(result.is_err());
        assert!(hooks.is_active("project"));
    }

    #[tokio::test]
    async fn guard_released_when_task_is_cancelled() {
        let hooks = AuditHooks::new();
        let cloned = Arc::clone(&hooks);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            let _guard = cloned.suspend("project");
            let _ = tx.send(());
            std::future::pending::<()>().await;
        });
        rx.await.unwrap();
        assert!(!hooks.is_active("project"));

        task.abort();
        let _ = task.await;
        assert!(hooks.is_active("project"));
    }
}
