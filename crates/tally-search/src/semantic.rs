//! Cosine similarity search over enrichment embeddings.
//!
//! The tenant predicate and every filter run in SQL before any similarity
//! is computed, so other tenants' records never compete for the top-k
//! slots. Ranking is a brute-force scan over the caller-visible candidates:
//! similarity descending, ties broken by most recent `occurred_at`.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::enums::{AccessAction, AccessOutcome, Severity};
use tally_core::identity::CallerContext;
use tally_db::repos::EmbeddingScan;
use tally_db::service::TallyService;
use tally_embeddings::{Embedder, cosine_similarity, normalize};

use crate::error::SearchError;

/// Filters for semantic search queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Defaults to the caller's tenant.
    pub tenant: Option<String>,
    /// Also rank shared baseline records.
    pub include_shared: bool,
    pub event_type: Option<String>,
    pub severity: Option<Severity>,
    /// Inclusive lower bound on `occurred_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `occurred_at`.
    pub to: Option<DateTime<Utc>>,
    pub anomalies_only: bool,
    /// Number of results to return.
    pub k: usize,
    /// Hits below this similarity are dropped.
    pub min_similarity: f32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            tenant: None,
            include_shared: false,
            event_type: None,
            severity: None,
            from: None,
            to: None,
            anomalies_only: false,
            k: 10,
            min_similarity: -1.0,
        }
    }
}

impl SearchFilters {
    fn scan(&self) -> EmbeddingScan {
        EmbeddingScan {
            tenant: self.tenant.clone(),
            include_shared: self.include_shared,
            event_type: self.event_type.clone(),
            severity: self.severity,
            from: self.from,
            to: self.to,
            anomalies_only: self.anomalies_only,
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record_id: String,
    pub tenant_id: Option<String>,
    pub similarity: f32,
    pub occurred_at: DateTime<Utc>,
}

fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.occurred_at.cmp(&a.occurred_at))
        .then_with(|| a.record_id.cmp(&b.record_id))
}

/// The `k` best hits in rank order, without sorting the rest.
fn top_k(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    if k == 0 {
        return Vec::new();
    }
    if hits.len() > k {
        hits.select_nth_unstable_by(k - 1, rank);
        hits.truncate(k);
    }
    hits.sort_by(rank);
    hits
}

/// Rank caller-visible records by cosine similarity to `query`.
///
/// # Errors
///
/// Returns [`SearchError::InvalidQuery`] for an empty or zero query vector
/// or `k = 0`, and [`SearchError::Database`] if the caller may not search
/// the requested scope.
pub async fn search(
    svc: &TallyService,
    caller: &CallerContext,
    query: &[f32],
    filters: &SearchFilters,
) -> Result<Vec<SearchHit>, SearchError> {
    rank_visible(svc, caller, query, filters, None).await
}

/// Embed `text` and search with the resulting vector.
///
/// # Errors
///
/// Returns [`SearchError::InvalidQuery`] for blank text,
/// [`SearchError::Embedding`] if the embedder fails, or any error of
/// [`search`].
pub async fn search_text(
    svc: &TallyService,
    caller: &CallerContext,
    embedder: Arc<dyn Embedder>,
    text: &str,
    filters: &SearchFilters,
) -> Result<Vec<SearchHit>, SearchError> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(SearchError::InvalidQuery("query text is empty".into()));
    }
    let query = tokio::task::spawn_blocking(move || embedder.embed_single(&text))
        .await
        .map_err(|e| SearchError::InvalidQuery(format!("embedding task failed: {e}")))??;
    search(svc, caller, &query, filters).await
}

/// Records most similar to an existing, visible, embedded record.
/// The record itself is excluded.
///
/// # Errors
///
/// Returns [`SearchError::InvalidQuery`] if the record has no embedding yet,
/// or [`SearchError::Database`] if it is not visible to the caller.
pub async fn similar_to_record(
    svc: &TallyService,
    caller: &CallerContext,
    record_id: &str,
    filters: &SearchFilters,
) -> Result<Vec<SearchHit>, SearchError> {
    let query = svc
        .get_embedding(caller, record_id)
        .await?
        .ok_or_else(|| SearchError::InvalidQuery(format!("record {record_id} is not embedded yet")))?;
    rank_visible(svc, caller, &query, filters, Some(record_id)).await
}

async fn rank_visible(
    svc: &TallyService,
    caller: &CallerContext,
    query: &[f32],
    filters: &SearchFilters,
    exclude: Option<&str>,
) -> Result<Vec<SearchHit>, SearchError> {
    if filters.k == 0 {
        return Err(SearchError::InvalidQuery("k must be positive".into()));
    }
    let mut q = query.to_vec();
    normalize(&mut q);
    if q.iter().all(|x| *x == 0.0) {
        return Err(SearchError::InvalidQuery("query vector is empty or zero".into()));
    }

    let candidates = svc.embedded_candidates(caller, &filters.scan()).await?;
    let scanned = candidates.len();
    let mut skipped = 0usize;
    let hits: Vec<SearchHit> = candidates
        .into_iter()
        .filter(|c| exclude != Some(c.record_id.as_str()))
        .filter_map(|c| {
            if c.embedding.len() != q.len() {
                skipped += 1;
                return None;
            }
            let similarity = cosine_similarity(&q, &c.embedding);
            (similarity >= filters.min_similarity).then(|| SearchHit {
                record_id: c.record_id,
                tenant_id: c.tenant_id,
                similarity,
                occurred_at: c.occurred_at,
            })
        })
        .collect();
    let hits = top_k(hits, filters.k);

    if skipped > 0 {
        tracing::debug!(skipped, dim = q.len(), "embeddings of another width ignored");
    }
    let scope = TallyService::effective_scope(caller, filters.tenant.as_deref());
    svc.log_access(
        caller,
        AccessAction::Search,
        Some(scope.unwrap_or("<all>")),
        Some(serde_json::json!({
            "k": filters.k,
            "scanned": scanned,
            "returned": hits.len(),
            "include_shared": filters.include_shared,
        })),
        AccessOutcome::Allowed,
        false,
    )
    .await?;

    Ok(hits)
}
