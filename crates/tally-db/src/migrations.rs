//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! database open. All statements use `IF NOT EXISTS` for idempotent re-running.

use crate::TallyDb;
use crate::error::DatabaseError;

/// Audit records, tracked entities, access log, immutability triggers.
const MIGRATION_001: &str = include_str!("../migrations/001_audit_trail.sql");
/// Enrichment side-table.
const MIGRATION_002: &str = include_str!("../migrations/002_enrichment.sql");
/// Export grants and artifacts.
const MIGRATION_003: &str = include_str!("../migrations/003_exports.sql");

impl TallyDb {
    /// Run all embedded migrations in sequence.
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        for (name, sql) in [
            ("001_audit_trail", MIGRATION_001),
            ("002_enrichment", MIGRATION_002),
            ("003_exports", MIGRATION_003),
        ] {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}
