//! Shared test utilities for tally-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use serde_json::json;
    use tally_config::TallyConfig;
    use tally_core::entities::{AuditRecord, RecordCandidate};
    use tally_core::enums::{Role, Severity};
    use tally_core::identity::CallerContext;

    use crate::TallyDb;
    use crate::service::TallyService;

    /// In-memory service with default configuration.
    pub async fn test_service() -> TallyService {
        let db = TallyDb::open_local(":memory:").await.unwrap();
        TallyService::from_db(db, TallyConfig::default())
    }

    pub fn member(tenant: &str) -> CallerContext {
        CallerContext::tenant(tenant, format!("{tenant}-member"), Role::Member)
    }

    pub fn auditor(tenant: &str) -> CallerContext {
        CallerContext::tenant(tenant, format!("{tenant}-auditor"), Role::Auditor)
    }

    pub fn candidate(caller: &CallerContext, event: &str) -> RecordCandidate {
        RecordCandidate::for_caller(
            caller,
            event,
            "project",
            "prj-1",
            Severity::Info,
            json!({ "field": "status", "old": "draft", "new": event }),
        )
    }

    /// Append `n` records for `caller` and return them in chain order.
    pub async fn append_n(svc: &TallyService, caller: &CallerContext, n: usize) -> Vec<AuditRecord> {
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(
                svc.append(caller, candidate(caller, &format!("event_{i}")))
                    .await
                    .unwrap(),
            );
        }
        out
    }
}
