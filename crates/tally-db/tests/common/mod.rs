//! Fixtures shared by the tally-db integration suites.

#![allow(dead_code)]

use serde_json::json;
use tally_config::TallyConfig;
use tally_core::entities::{AuditRecord, RecordCandidate};
use tally_core::enums::{Role, Severity};
use tally_core::identity::CallerContext;
use tally_db::TallyDb;
use tally_db::service::TallyService;

pub async fn memory_service() -> TallyService {
    let db = TallyDb::open_local(":memory:").await.unwrap();
    TallyService::from_db(db, TallyConfig::default())
}

/// Config pointing at a database file inside `dir`.
pub fn file_config(dir: &std::path::Path) -> TallyConfig {
    let mut config = TallyConfig::default();
    config.database.path = dir.join("tally.db").display().to_string();
    config
}

pub fn member(tenant: &str) -> CallerContext {
    CallerContext::tenant(tenant, format!("{tenant}-member"), Role::Member)
}

pub fn auditor(tenant: &str) -> CallerContext {
    CallerContext::tenant(tenant, format!("{tenant}-auditor"), Role::Auditor)
}

pub fn candidate(caller: &CallerContext, event: &str, details: serde_json::Value) -> RecordCandidate {
    RecordCandidate::for_caller(caller, event, "project", "prj-1", Severity::Info, details)
}

pub async fn append_events(svc: &TallyService, caller: &CallerContext, events: &[&str]) -> Vec<AuditRecord> {
    let mut out = Vec::new();
    for event in events {
        let c = candidate(caller, event, json!({ "event": event }));
        out.push(svc.append(caller, c).await.unwrap());
    }
    out
}
