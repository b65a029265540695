//! Tamper evidence of the per-tenant hash chains.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use tally_core::chain::{DivergenceKind, GENESIS_HASH};
use tally_core::identity::CallerContext;

use common::{append_events, candidate, member, memory_service};

#[tokio::test]
async fn intact_after_appends_on_every_chain() {
    let svc = memory_service().await;
    let sys = CallerContext::system();
    append_events(&svc, &member("acme"), &["created", "renamed", "archived"]).await;
    append_events(&svc, &member("globex"), &["created"]).await;
    append_events(&svc, &sys, &["baseline_seeded"]).await;

    for tenant in [Some("acme"), Some("globex"), None] {
        let result = svc.verify_chain(&sys, tenant, None, None).await.unwrap();
        assert!(result.is_intact(), "{tenant:?}: {:?}", result.divergence);
    }
    let acme = svc.verify_chain(&sys, Some("acme"), None, None).await.unwrap();
    assert_eq!(acme.records_checked, 3);
}

#[tokio::test]
async fn edited_details_detected_at_the_edited_record() {
    let svc = memory_service().await;
    let acme = member("acme");
    let records = append_events(&svc, &acme, &["r1", "r2", "r3"]).await;

    // Out-of-band edit: bypass the immutability trigger the way an operator
    // with raw storage access could.
    let conn = svc.db().conn();
    conn.execute("DROP TRIGGER audit_records_no_update", ()).await.unwrap();
    conn.execute(
        "UPDATE audit_records SET action_details = ?1 WHERE id = ?2",
        libsql::params![json!({ "event": "forged" }).to_string(), records[1].id.as_str()],
    )
    .await
    .unwrap();

    let result = svc.verify_chain(&acme, Some("acme"), Some(1), Some(3)).await.unwrap();
    let divergence = result.divergence.expect("edit must be detected");
    assert_eq!(divergence.seq, 2);
    assert_eq!(divergence.record_id, records[1].id);
    assert_eq!(divergence.kind, DivergenceKind::ContentMismatch);
}

#[tokio::test]
async fn removed_record_detected_as_gap() {
    let svc = memory_service().await;
    let acme = member("acme");
    let records = append_events(&svc, &acme, &["r1", "r2", "r3"]).await;

    let conn = svc.db().conn();
    conn.execute("DROP TRIGGER audit_records_no_delete", ()).await.unwrap();
    conn.execute("DELETE FROM audit_records WHERE id = ?1", [records[1].id.as_str()])
        .await
        .unwrap();

    let result = svc.verify_chain(&acme, Some("acme"), None, Some(3)).await.unwrap();
    let divergence = result.divergence.expect("gap must be detected");
    assert_eq!(divergence.kind, DivergenceKind::SequenceGap);
    assert_eq!(divergence.expected, "2");
    assert_eq!(divergence.record_id, records[2].id);
}

#[tokio::test]
async fn other_chains_unaffected_by_tampering() {
    let svc = memory_service().await;
    let acme_records = append_events(&svc, &member("acme"), &["r1", "r2"]).await;
    append_events(&svc, &member("globex"), &["g1", "g2"]).await;

    let conn = svc.db().conn();
    conn.execute("DROP TRIGGER audit_records_no_update", ()).await.unwrap();
    conn.execute(
        "UPDATE audit_records SET severity = 'critical' WHERE id = ?1",
        [acme_records[0].id.as_str()],
    )
    .await
    .unwrap();

    let sys = CallerContext::system();
    assert!(!svc.verify_chain(&sys, Some("acme"), None, None).await.unwrap().is_intact());
    assert!(svc.verify_chain(&sys, Some("globex"), None, None).await.unwrap().is_intact());
}

#[tokio::test]
async fn partial_range_starts_from_stored_predecessor() {
    let svc = memory_service().await;
    let acme = member("acme");
    append_events(&svc, &acme, &["r1", "r2", "r3", "r4"]).await;

    let result = svc.verify_chain(&acme, Some("acme"), Some(3), Some(4)).await.unwrap();
    assert!(result.is_intact());
    assert_eq!(result.records_checked, 2);
}

#[tokio::test]
async fn empty_chain_verifies_trivially() {
    let svc = memory_service().await;
    let acme = member("acme");
    let result = svc.verify_chain(&acme, Some("acme"), None, None).await.unwrap();
    assert!(result.is_intact());
    assert_eq!(result.records_checked, 0);

    let tail = svc.chain_tail(&acme, Some("acme")).await.unwrap();
    assert_eq!(tail.chain_hash, GENESIS_HASH);
    assert_eq!(tail.seq, 0);
}

#[tokio::test]
async fn tail_tracks_last_append() {
    let svc = memory_service().await;
    let acme = member("acme");
    let c = candidate(&acme, "created", json!({}));
    let record = svc.append(&acme, c).await.unwrap();
    let tail = svc.chain_tail(&acme, Some("acme")).await.unwrap();
    assert_eq!(tail.seq, 1);
    assert_eq!(tail.chain_hash, record.chain_hash);
}
