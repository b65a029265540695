//! Ranking, filtering and tenant isolation of semantic search.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use tally_config::TallyConfig;
use tally_core::entities::{AuditRecord, RecordCandidate};
use tally_core::enums::{AccessAction, Role, Severity};
use tally_core::identity::CallerContext;
use tally_db::TallyDb;
use tally_db::error::DatabaseError;
use tally_db::repos::AccessLogFilter;
use tally_db::service::TallyService;
use tally_embeddings::{Embedder, HashingEmbedder};
use tally_search::{SearchError, SearchFilters, search, search_text, similar_to_record};

async fn service() -> TallyService {
    let db = TallyDb::open_local(":memory:").await.unwrap();
    TallyService::from_db(db, TallyConfig::default())
}

fn member(tenant: &str) -> CallerContext {
    CallerContext::tenant(tenant, format!("{tenant}-member"), Role::Member)
}

/// Append a record and attach `vector` as its embedding.
async fn embedded(
    svc: &TallyService,
    caller: &CallerContext,
    event: &str,
    minutes_ago: i64,
    vector: &[f32],
) -> AuditRecord {
    let mut c = RecordCandidate::for_caller(caller, event, "project", "prj-1", Severity::Info, json!({}));
    c.occurred_at = Some(Utc::now() - Duration::minutes(minutes_ago));
    let record = svc.append(caller, c).await.unwrap();
    svc.store_embedding(&CallerContext::system(), &record.id, vector)
        .await
        .unwrap();
    record
}

fn filters(k: usize) -> SearchFilters {
    SearchFilters {
        k,
        ..SearchFilters::default()
    }
}

#[tokio::test]
async fn ranks_by_similarity() {
    let svc = service().await;
    let acme = member("acme");
    let far = embedded(&svc, &acme, "a", 3, &[0.0, 1.0]).await;
    let near = embedded(&svc, &acme, "b", 2, &[1.0, 0.1]).await;
    let mid = embedded(&svc, &acme, "c", 1, &[0.7, 0.7]).await;

    let hits = search(&svc, &acme, &[1.0, 0.0], &filters(10)).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.record_id.as_str()).collect();
    assert_eq!(ids, vec![near.id.as_str(), mid.id.as_str(), far.id.as_str()]);
    assert!(hits[0].similarity > 0.99);
}

#[tokio::test]
async fn equal_similarity_prefers_recent() {
    let svc = service().await;
    let acme = member("acme");
    let older = embedded(&svc, &acme, "a", 30, &[1.0, 0.0]).await;
    let newer = embedded(&svc, &acme, "b", 5, &[2.0, 0.0]).await;

    let hits = search(&svc, &acme, &[1.0, 0.0], &filters(2)).await.unwrap();
    assert_eq!(hits[0].record_id, newer.id);
    assert_eq!(hits[1].record_id, older.id);
}

#[tokio::test]
async fn other_tenants_never_crowd_out_results() {
    let svc = service().await;
    let acme = member("acme");
    let globex = member("globex");
    for i in 0..8 {
        embedded(&svc, &globex, "g", i, &[1.0, 0.0]).await;
    }
    let mut mine = Vec::new();
    for i in 0..3 {
        mine.push(embedded(&svc, &acme, "a", i, &[0.2, 1.0]).await.id);
    }

    let hits = search(&svc, &acme, &[1.0, 0.0], &filters(3)).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.tenant_id.as_deref() == Some("acme")));
    for hit in &hits {
        assert!(mine.contains(&hit.record_id));
    }
}

#[tokio::test]
async fn foreign_scope_is_refused() {
    let svc = service().await;
    let acme = member("acme");
    embedded(&svc, &member("globex"), "g", 1, &[1.0, 0.0]).await;

    let f = SearchFilters {
        tenant: Some("globex".into()),
        ..filters(5)
    };
    let err = search(&svc, &acme, &[1.0, 0.0], &f).await.unwrap_err();
    assert!(matches!(
        err,
        SearchError::Database(DatabaseError::TenantScopeViolation { .. })
    ));
}

#[tokio::test]
async fn shared_baseline_joins_only_on_request() {
    let svc = service().await;
    let acme = member("acme");
    let baseline = embedded(&svc, &CallerContext::system(), "baseline", 1, &[1.0, 0.0]).await;
    embedded(&svc, &acme, "a", 1, &[0.0, 1.0]).await;

    let own = search(&svc, &acme, &[1.0, 0.0], &filters(5)).await.unwrap();
    assert!(own.iter().all(|h| h.record_id != baseline.id));

    let f = SearchFilters {
        include_shared: true,
        ..filters(5)
    };
    let with_shared = search(&svc, &acme, &[1.0, 0.0], &f).await.unwrap();
    assert_eq!(with_shared[0].record_id, baseline.id);
    assert_eq!(with_shared[0].tenant_id, None);
}

#[tokio::test]
async fn min_similarity_and_event_filter_apply() {
    let svc = service().await;
    let acme = member("acme");
    let login = embedded(&svc, &acme, "user.login", 1, &[1.0, 0.0]).await;
    embedded(&svc, &acme, "user.login", 2, &[-1.0, 0.0]).await;
    embedded(&svc, &acme, "file.read", 3, &[1.0, 0.0]).await;

    let f = SearchFilters {
        event_type: Some("user.login".into()),
        min_similarity: 0.5,
        ..filters(10)
    };
    let hits = search(&svc, &acme, &[1.0, 0.0], &f).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record_id, login.id);
}

#[tokio::test]
async fn invalid_queries_rejected() {
    let svc = service().await;
    let acme = member("acme");
    assert!(matches!(
        search(&svc, &acme, &[0.0, 0.0], &filters(5)).await,
        Err(SearchError::InvalidQuery(_))
    ));
    assert!(matches!(
        search(&svc, &acme, &[1.0], &filters(0)).await,
        Err(SearchError::InvalidQuery(_))
    ));
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
    assert!(matches!(
        search_text(&svc, &acme, embedder, "   ", &filters(5)).await,
        Err(SearchError::InvalidQuery(_))
    ));
}

#[tokio::test]
async fn text_search_uses_embedder() {
    let svc = service().await;
    let acme = member("acme");
    let embedder = HashingEmbedder::default();
    let texts = ["password reset requested", "invoice exported to csv"];
    let mut ids = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let v = embedder.embed_single(text).unwrap();
        ids.push(embedded(&svc, &acme, "e", i64::try_from(i).unwrap(), &v).await.id);
    }

    let shared: Arc<dyn Embedder> = Arc::new(embedder);
    let hits = search_text(&svc, &acme, shared, "password reset", &filters(1))
        .await
        .unwrap();
    assert_eq!(hits[0].record_id, ids[0]);
}

#[tokio::test]
async fn similar_records_exclude_the_seed() {
    let svc = service().await;
    let acme = member("acme");
    let seed = embedded(&svc, &acme, "a", 3, &[1.0, 0.0]).await;
    let twin = embedded(&svc, &acme, "b", 2, &[0.9, 0.1]).await;
    embedded(&svc, &acme, "c", 1, &[0.0, 1.0]).await;

    let hits = similar_to_record(&svc, &acme, &seed.id, &filters(1)).await.unwrap();
    assert_eq!(hits[0].record_id, twin.id);
    assert!(hits.iter().all(|h| h.record_id != seed.id));
}

#[tokio::test]
async fn searches_are_meta_audited() {
    let svc = service().await;
    let acme = member("acme");
    embedded(&svc, &acme, "a", 1, &[1.0, 0.0]).await;
    search(&svc, &acme, &[1.0, 0.0], &filters(3)).await.unwrap();

    let auditor = CallerContext::tenant("acme", "acme-auditor", Role::Auditor);
    let log = svc
        .query_access_log(
            &auditor,
            &AccessLogFilter {
                action: Some(AccessAction::Search),
                ..AccessLogFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].actor_id, "acme-member");
    assert_eq!(log[0].detail.as_ref().unwrap()["returned"], json!(1));
}
