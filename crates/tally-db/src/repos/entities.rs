//! Tracked entity collection, its per-row audit hook, and the bulk
//! ingestion fast path.
//!
//! A normal upsert writes the entity and, while the hook for its kind is
//! active, appends an `entity_upserted` record in the same transaction.
//! `bulk_append` suspends that hook for the duration of one batched write
//! and then appends a single `bulk_import` summary per target tenant instead. The summary has
//! no per-row detail: individual imported rows are not reconstructible
//! from the trail.

use std::collections::BTreeMap;

use chrono::Utc;
use tally_core::audit_detail::{BulkImportDetail, EVENT_BULK_IMPORT, EVENT_ENTITY_UPSERTED, EntityUpsertDetail};
use tally_core::chain::{canonical_json_string, truncate_to_micros};
use tally_core::entities::{EntityRow, MAX_IDENT_LEN, RecordCandidate, TrackedEntity};
use tally_core::enums::{Operation, Severity};
use tally_core::identity::CallerContext;

use crate::error::DatabaseError;
use crate::helpers::{parse_datetime, parse_json, ts};
use crate::service::TallyService;

/// Rows written between cooperative yields during a bulk import.
const YIELD_EVERY: usize = 256;

const UPSERT_SQL: &str = "INSERT INTO tracked_entities (tenant_key, entity_kind, entity_id, payload, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(tenant_key, entity_kind, entity_id)
     DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at";

fn check_ident(field: &str, value: &str) -> Result<(), DatabaseError> {
    if value.trim().is_empty() || value.len() > MAX_IDENT_LEN {
        return Err(DatabaseError::MalformedCandidate(format!(
            "{field} must be 1..={MAX_IDENT_LEN} characters"
        )));
    }
    Ok(())
}

impl TallyService {
    /// Insert or replace a tracked entity in the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not write, the identifiers
    /// are malformed, or the write or its audit record fails (in which case
    /// neither is committed).
    pub async fn upsert_entity(
        &self,
        caller: &CallerContext,
        entity_kind: &str,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<TrackedEntity, DatabaseError> {
        let tenant = caller.tenant_id();
        self.authorize(caller, Operation::Write, tenant).await?;
        check_ident("entity_kind", entity_kind)?;
        check_ident("entity_id", entity_id)?;

        let tenant_key = tenant.unwrap_or("").to_string();
        let payload_text = canonical_json_string(&payload)?;
        let updated_at = truncate_to_micros(Utc::now());

        self.db()
            .in_transaction(async {
                let mut rows = self
                    .db()
                    .query_with(
                        "SELECT 1 FROM tracked_entities WHERE tenant_key = ?1 AND entity_kind = ?2 AND entity_id = ?3",
                        || libsql::params![tenant_key.as_str(), entity_kind, entity_id],
                    )
                    .await?;
                let created = rows.next().await?.is_none();

                self.db()
                    .execute_with(UPSERT_SQL, || {
                        libsql::params![
                            tenant_key.as_str(),
                            entity_kind,
                            entity_id,
                            payload_text.as_str(),
                            ts(&updated_at)
                        ]
                    })
                    .await?;

                if self.hooks().is_active(entity_kind) {
                    let detail = EntityUpsertDetail {
                        entity_kind: entity_kind.to_string(),
                        created,
                        payload: payload.clone(),
                    };
                    let candidate = RecordCandidate::for_caller(
                        caller,
                        EVENT_ENTITY_UPSERTED,
                        entity_kind,
                        entity_id,
                        Severity::Info,
                        serde_json::to_value(&detail).map_err(anyhow::Error::from)?,
                    );
                    self.append_with_retry(caller, candidate).await?;
                }
                Ok(())
            })
            .await?;

        Ok(TrackedEntity {
            tenant_id: tenant.map(str::to_string),
            entity_kind: entity_kind.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            updated_at,
        })
    }

    /// Read a tracked entity from the caller's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if it does not exist there.
    pub async fn get_entity(
        &self,
        caller: &CallerContext,
        entity_kind: &str,
        entity_id: &str,
    ) -> Result<TrackedEntity, DatabaseError> {
        let tenant = caller.tenant_id();
        self.authorize(caller, Operation::Read, tenant).await?;
        let mut rows = self
            .db()
            .query_with(
                "SELECT payload, updated_at FROM tracked_entities WHERE tenant_key = ?1 AND entity_kind = ?2 AND entity_id = ?3",
                || libsql::params![tenant.unwrap_or(""), entity_kind, entity_id],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| DatabaseError::NotFound {
            entity_type: "tracked entity",
            id: format!("{entity_kind}/{entity_id}"),
        })?;
        Ok(TrackedEntity {
            tenant_id: tenant.map(str::to_string),
            entity_kind: entity_kind.to_string(),
            entity_id: entity_id.to_string(),
            payload: parse_json(&row.get::<String>(0)?)?,
            updated_at: parse_datetime(&row.get::<String>(1)?)?,
        })
    }

    /// Bulk ingestion fast path.
    ///
    /// Rows are grouped by target tenant: a row's own `tenant_id`, or the
    /// caller's tenant when it has none. The per-row hook for `entity_kind`
    /// is suspended while the groups are written, then each group gets
    /// exactly one `bulk_import` summary on its own tenant chain. Rows and
    /// summaries commit in one transaction: on failure or cancellation the
    /// hook comes back and nothing is written.
    ///
    /// Only the system identity may target a tenant other than its own.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not write any target
    /// tenant, any row is rejected by the store, or a summary append fails.
    pub async fn bulk_append(
        &self,
        caller: &CallerContext,
        entity_kind: &str,
        rows: impl IntoIterator<Item = EntityRow>,
    ) -> Result<u64, DatabaseError> {
        check_ident("entity_kind", entity_kind)?;

        let mut groups: BTreeMap<Option<String>, Vec<EntityRow>> = BTreeMap::new();
        for row in rows {
            if row.tenant_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(DatabaseError::MalformedCandidate(format!(
                    "row {:?} has an empty tenant_id",
                    row.entity_id
                )));
            }
            let target = row.tenant_id.clone().or_else(|| caller.tenant_id.clone());
            groups.entry(target).or_default().push(row);
        }
        if groups.is_empty() {
            groups.insert(caller.tenant_id.clone(), Vec::new());
        }
        for target in groups.keys() {
            self.authorize(caller, Operation::Write, target.as_deref()).await?;
        }

        let imported = self
            .db()
            .in_transaction(async {
                let suspension = self.hooks().suspend(entity_kind);
                tracing::info!(
                    caller = %caller.describe(),
                    entity_kind,
                    tenants = groups.len(),
                    "bulk import started, per-row audit hook suspended"
                );
                let mut counts = Vec::with_capacity(groups.len());
                for (target, rows) in &groups {
                    let count = self
                        .write_batch(target.as_deref().unwrap_or(""), entity_kind, rows)
                        .await?;
                    counts.push((target, count));
                }
                drop(suspension);

                for (target, count) in &counts {
                    let detail = BulkImportDetail {
                        entity_kind: entity_kind.to_string(),
                        row_count: *count,
                        per_row_detail: false,
                    };
                    let mut summary = RecordCandidate::for_caller(
                        caller,
                        EVENT_BULK_IMPORT,
                        entity_kind,
                        "*",
                        Severity::Info,
                        serde_json::to_value(&detail).map_err(anyhow::Error::from)?,
                    );
                    summary.tenant_id.clone_from(*target);
                    self.append_with_retry(caller, summary).await?;
                }
                Ok(counts.iter().map(|(_, count)| count).sum::<u64>())
            })
            .await;

        match imported {
            Ok(count) => {
                tracing::info!(entity_kind, rows = count, tenants = groups.len(), "bulk import committed");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(entity_kind, error = %e, "bulk import failed");
                Err(e)
            }
        }
    }

    async fn write_batch(
        &self,
        tenant_key: &str,
        entity_kind: &str,
        rows: &[EntityRow],
    ) -> Result<u64, DatabaseError> {
        let updated_at = ts(&truncate_to_micros(Utc::now()));
        let mut count = 0u64;
        for (i, row) in rows.iter().enumerate() {
            if i % YIELD_EVERY == YIELD_EVERY - 1 {
                // Keep long imports cancellable.
                tokio::task::yield_now().await;
            }
            let payload = canonical_json_string(&row.payload)?;
            self.db()
                .execute_with(UPSERT_SQL, || {
                    libsql::params![
                        tenant_key,
                        entity_kind,
                        row.entity_id.as_str(),
                        payload.as_str(),
                        updated_at.as_str()
                    ]
                })
                .await
                .map_err(|e| {
                    DatabaseError::MalformedCandidate(format!(
                        "row {} ({:?}) rejected: {e}",
                        count + 1,
                        row.entity_id
                    ))
                })?;
            count += 1;
        }
        Ok(count)
    }
}
