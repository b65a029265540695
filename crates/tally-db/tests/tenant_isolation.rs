//! No read path lets one tenant observe another tenant's records.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use tally_core::enums::{AccessAction, AccessOutcome};
use tally_core::identity::CallerContext;
use tally_db::error::DatabaseError;
use tally_db::repos::{AccessLogFilter, EmbeddingScan, ExportRequest, RecordFilter};

use common::{append_events, auditor, candidate, member, memory_service};

#[tokio::test]
async fn point_lookup_hides_foreign_records() {
    let svc = memory_service().await;
    let globex = append_events(&svc, &member("globex"), &["secret"]).await;

    let err = svc.get_record(&member("acme"), &globex[0].id).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound { .. }));
}

#[tokio::test]
async fn range_query_never_returns_foreign_records() {
    let svc = memory_service().await;
    append_events(&svc, &member("acme"), &["a1", "a2"]).await;
    append_events(&svc, &member("globex"), &["g1", "g2", "g3"]).await;
    append_events(&svc, &CallerContext::system(), &["baseline"]).await;

    let filter = RecordFilter {
        include_shared: true,
        ..RecordFilter::default()
    };
    let records = svc.query_records(&member("acme"), &filter).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(
        records
            .iter()
            .all(|r| r.tenant_id.is_none() || r.tenant_id.as_deref() == Some("acme"))
    );
}

#[tokio::test]
async fn explicit_foreign_scope_is_a_security_event() {
    let svc = memory_service().await;
    append_events(&svc, &member("globex"), &["g1"]).await;
    let acme = auditor("acme");

    let filter = RecordFilter {
        tenant: Some("globex".into()),
        ..RecordFilter::default()
    };
    let err = svc.query_records(&acme, &filter).await.unwrap_err();
    assert!(matches!(err, DatabaseError::TenantScopeViolation { .. }));

    let log = svc
        .query_access_log(
            &acme,
            &AccessLogFilter {
                security_only: true,
                ..AccessLogFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, AccessAction::ScopeViolation);
    assert_eq!(log[0].outcome, AccessOutcome::Denied);
    assert_eq!(log[0].target.as_deref(), Some("globex"));
    assert!(log[0].is_untampered());
}

#[tokio::test]
async fn embedding_scan_filters_tenant_before_ranking() {
    let svc = memory_service().await;
    let sys = CallerContext::system();
    let acme = append_events(&svc, &member("acme"), &["a1"]).await;
    let globex = append_events(&svc, &member("globex"), &["g1", "g2"]).await;
    for r in acme.iter().chain(&globex) {
        svc.store_embedding(&sys, &r.id, &[1.0, 0.0]).await.unwrap();
    }

    let candidates = svc
        .embedded_candidates(&member("acme"), &EmbeddingScan::default())
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].record_id, acme[0].id);
}

#[tokio::test]
async fn export_of_foreign_tenant_rejected() {
    let svc = memory_service().await;
    append_events(&svc, &member("globex"), &["g1"]).await;

    let request = ExportRequest::new(
        RecordFilter {
            tenant: Some("globex".into()),
            ..RecordFilter::default()
        },
        tally_core::enums::ExportFormat::Json,
    );
    let err = svc.create_export(&auditor("acme"), request).await.unwrap_err();
    assert!(matches!(err, DatabaseError::TenantScopeViolation { .. }));
}

#[tokio::test]
async fn tenants_cannot_write_shared_baseline() {
    let svc = memory_service().await;
    let acme = member("acme");
    let mut c = candidate(&acme, "baseline_override", json!({}));
    c.tenant_id = None;

    let err = svc.append(&acme, c).await.unwrap_err();
    assert!(matches!(err, DatabaseError::TenantScopeViolation { .. }));

    let shared = svc
        .query_records(&CallerContext::system(), &RecordFilter::default())
        .await
        .unwrap();
    assert!(shared.is_empty());
}

#[tokio::test]
async fn access_log_is_tenant_scoped() {
    let svc = memory_service().await;
    let globex = append_events(&svc, &member("globex"), &["g1"]).await;
    svc.get_record(&member("globex"), &globex[0].id).await.unwrap();

    let acme_view = svc
        .query_access_log(&auditor("acme"), &AccessLogFilter::default())
        .await
        .unwrap();
    assert!(acme_view.iter().all(|e| e.tenant_id.as_deref() == Some("acme")));

    let err = svc
        .query_access_log(
            &auditor("acme"),
            &AccessLogFilter {
                tenant: Some("globex".into()),
                ..AccessLogFilter::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::TenantScopeViolation { .. }));
}
