//! Chain verification.
//!
//! Recomputes content and chain hashes over a range of one chain and reports
//! the first divergence. Records are streamed in pages so a long chain never
//! has to fit in memory.

use tally_core::chain::{Divergence, DivergenceKind, GENESIS_HASH, VerificationResult, verify_sequence};
use tally_core::entities::AuditRecord;
use tally_core::enums::{AccessAction, AccessOutcome, Operation};
use tally_core::identity::CallerContext;

use crate::error::DatabaseError;
use crate::repos::records::{RECORD_SELECT, chain_key, record_from_row};
use crate::service::TallyService;

const VERIFY_PAGE: i64 = 500;

impl TallyService {
    /// Verify positions `from..=to` of a chain (`tenant_id = None` is the
    /// shared baseline). `from` defaults to 1, `to` to the current tail.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the caller may not read the chain or a
    /// query fails. A broken chain is not an error: it is reported in
    /// [`VerificationResult::divergence`].
    pub async fn verify_chain(
        &self,
        caller: &CallerContext,
        tenant_id: Option<&str>,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<VerificationResult, DatabaseError> {
        self.authorize(caller, Operation::Verify, tenant_id).await?;

        let key = chain_key(tenant_id);
        let from_seq = from.unwrap_or(1).max(1);
        let to_seq = match to {
            Some(to) => to,
            None => self.read_tail(tenant_id).await?.seq,
        };

        let (records_checked, divergence) = self.walk_chain(key, from_seq, to_seq).await?;

        let result = VerificationResult {
            tenant_id: tenant_id.map(str::to_string),
            from_seq,
            to_seq,
            records_checked,
            divergence,
        };

        if let Some(ref d) = result.divergence {
            tracing::error!(
                tenant = key,
                chain_seq = d.seq,
                record_id = %d.record_id,
                kind = ?d.kind,
                "chain divergence detected"
            );
        } else {
            tracing::info!(tenant = key, from_seq, to_seq, records_checked, "chain verified");
        }

        self.log_access(
            caller,
            AccessAction::Verify,
            Some(if key.is_empty() { "<shared>" } else { key }),
            Some(serde_json::json!({
                "from_seq": from_seq,
                "to_seq": to_seq,
                "intact": result.is_intact(),
            })),
            AccessOutcome::Allowed,
            false,
        )
        .await?;

        Ok(result)
    }

    async fn walk_chain(
        &self,
        key: &str,
        from_seq: i64,
        to_seq: i64,
    ) -> Result<(u64, Option<Divergence>), DatabaseError> {
        let mut prev = if from_seq == 1 {
            GENESIS_HASH.to_string()
        } else {
            let mut rows = self
                .db()
                .query_with(
                    "SELECT chain_hash FROM audit_records WHERE chain_key = ?1 AND seq = ?2",
                    || libsql::params![key, from_seq - 1],
                )
                .await?;
            match rows.next().await? {
                Some(row) => row.get::<String>(0)?,
                None => {
                    return Ok((
                        0,
                        Some(Divergence {
                            seq: from_seq - 1,
                            record_id: String::new(),
                            kind: DivergenceKind::SequenceGap,
                            expected: (from_seq - 1).to_string(),
                            actual: "missing".into(),
                        }),
                    ));
                }
            }
        };

        let sql = format!(
            "{RECORD_SELECT} WHERE r.chain_key = ?1 AND r.seq >= ?2 AND r.seq <= ?3 ORDER BY r.seq ASC LIMIT {VERIFY_PAGE}"
        );
        let mut next_seq = from_seq;
        let mut checked = 0u64;

        while next_seq <= to_seq {
            let mut rows = self
                .db()
                .query_with(&sql, || libsql::params![key, next_seq, to_seq])
                .await?;
            let mut page: Vec<AuditRecord> = Vec::new();
            while let Some(row) = rows.next().await? {
                page.push(record_from_row(&row)?);
            }

            if page.is_empty() {
                // The range promised more records than the chain holds.
                return Ok((
                    checked,
                    Some(Divergence {
                        seq: next_seq,
                        record_id: String::new(),
                        kind: DivergenceKind::SequenceGap,
                        expected: next_seq.to_string(),
                        actual: "missing".into(),
                    }),
                ));
            }

            let (page_checked, divergence) = verify_sequence(next_seq, &prev, &page)?;
            checked += page_checked;
            if divergence.is_some() {
                return Ok((checked, divergence));
            }

            // A page without divergence ends on a stored hash equal to the recomputed one.
            if let Some(last) = page.last() {
                prev.clone_from(&last.chain_hash);
                next_seq = last.seq + 1;
            }
        }

        Ok((checked, None))
    }
}
