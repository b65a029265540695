//! # tally-db
//!
//! libSQL storage for the Tally audit trail engine.
//!
//! Hosts the hash-chained event store, the access policy that wraps every
//! read and write, the per-row audit hooks and bulk ingestion fast path,
//! the enrichment side-table, the meta-audit access log, and export grants.
//!
//! Uses the `libsql` crate (C `SQLite` fork). Autocommit statements share
//! one connection; every multi-statement write runs in
//! [`TallyDb::in_transaction`] on a connection of its own. Chain continuity
//! is enforced by unique indexes at the commit boundary rather than by
//! shared in-memory state.

pub mod error;
pub mod helpers;
pub mod hooks;
mod migrations;
pub mod policy;
pub mod repos;
pub mod retry;
pub mod service;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use error::DatabaseError;
use libsql::params::IntoParams;
use libsql::{Builder, Connection, TransactionBehavior};
use tokio::sync::{Mutex, MutexGuard};
use tally_core::ids::{ID_RANDOM_BYTES, PREFIX_GRANT, TOKEN_RANDOM_BYTES};

use crate::retry::RetryConfig;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Connection of the transaction the current task is running, tagged
    /// with the handle that opened it.
    static ACTIVE_TX: (u64, Connection);
}

/// Central database handle for all Tally state.
///
/// Wraps a libSQL database and its autocommit connection. Provides ID
/// generation, retrying statement helpers, and transaction scoping used by
/// every repository method. Safe to share between tasks.
pub struct TallyDb {
    db: libsql::Database,
    conn: Connection,
    handle: u64,
    busy_timeout: Duration,
    /// Private in-memory databases cannot be reopened, so their single
    /// connection is handed out to one transaction at a time.
    memory_gate: Option<Mutex<()>>,
    retry: RetryConfig,
}

impl TallyDb {
    /// Open a local database at the given path (or `:memory:`).
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        Self::open_local_with_timeout(path, Duration::from_millis(5_000)).await
    }

    /// Open a local database, waiting up to `busy_timeout` on locks held by
    /// other connections.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local_with_timeout(
        path: &str,
        busy_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        configure(&conn, busy_timeout).await?;

        if path != ":memory:" {
            // Readers never block the appender in WAL mode.
            let mut rows = conn
                .query("PRAGMA journal_mode = WAL", ())
                .await
                .map_err(|e| DatabaseError::Migration(format!("PRAGMA journal_mode: {e}")))?;
            while rows.next().await?.is_some() {}
        }

        let in_memory = path == ":memory:";
        let tally_db = Self {
            db,
            conn,
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            busy_timeout,
            memory_gate: in_memory.then(|| Mutex::new(())),
            retry: RetryConfig::default(),
        };
        tally_db.run_migrations().await?;
        Ok(tally_db)
    }

    /// The connection statements should run on: the current task's
    /// transaction if it opened one on this handle, else the shared
    /// autocommit connection.
    #[must_use]
    pub fn conn(&self) -> Connection {
        self.active_tx().unwrap_or_else(|| self.conn.clone())
    }

    fn active_tx(&self) -> Option<Connection> {
        ACTIVE_TX
            .try_with(|(handle, conn)| (*handle == self.handle).then(|| conn.clone()))
            .ok()
            .flatten()
    }

    /// Drive `body` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Every statement `body` issues through this handle (including nested
    /// appends) joins the transaction. Commits when `body` returns `Ok`,
    /// rolls back otherwise, including when the future is dropped midway.
    /// Calls nested inside a running transaction just run `body`.
    ///
    /// # Errors
    ///
    /// Returns the error from `body`, or `DatabaseError` if the transaction
    /// cannot begin or commit.
    pub async fn in_transaction<T, Fut>(&self, body: Fut) -> Result<T, DatabaseError>
    where
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        if self.active_tx().is_some() {
            return body.await;
        }

        let _gate = match &self.memory_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        let conn = self.transaction_connection().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;

        match ACTIVE_TX.scope((self.handle, conn), body).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn transaction_connection(&self) -> Result<Connection, DatabaseError> {
        if self.memory_gate.is_some() {
            return Ok(self.conn.clone());
        }
        let conn = self.db.connect()?;
        configure(&conn, self.busy_timeout).await?;
        Ok(conn)
    }

    /// Autocommit statements on an in-memory database wait out any
    /// transaction holding the shared connection.
    async fn statement_gate(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.memory_gate {
            Some(gate) if self.active_tx().is_none() => Some(gate.lock().await),
            _ => None,
        }
    }

    /// Generate a prefixed ID via libSQL. Returns e.g. `"evt-a3f8b2c1d4e5f607"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        self.random_hex(prefix, ID_RANDOM_BYTES).await
    }

    /// Generate an export grant token (`xgt-` + 48 hex).
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_token(&self) -> Result<String, DatabaseError> {
        self.random_hex(PREFIX_GRANT, TOKEN_RANDOM_BYTES).await
    }

    async fn random_hex(&self, prefix: &str, bytes: usize) -> Result<String, DatabaseError> {
        let _gate = self.statement_gate().await;
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob({bytes})))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }

    /// Execute a statement, retrying transient lock contention.
    ///
    /// `params` is a factory because libSQL consumes parameters per call.
    ///
    /// # Errors
    ///
    /// Returns the last `DatabaseError` once retries are exhausted or on any
    /// non-transient failure.
    pub async fn execute_with<P, F>(&self, sql: &str, params: F) -> Result<u64, DatabaseError>
    where
        P: IntoParams,
        F: Fn() -> P,
    {
        let _gate = self.statement_gate().await;
        let conn = self.conn();
        let mut attempt = 1;
        loop {
            match conn.execute(sql, params()).await {
                Ok(changed) => return Ok(changed),
                Err(e) if retry::is_transient(&e) && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, error = %e, "transient lock, retrying statement");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run a query, retrying transient lock contention.
    ///
    /// # Errors
    ///
    /// Returns the last `DatabaseError` once retries are exhausted or on any
    /// non-transient failure.
    pub async fn query_with<P, F>(&self, sql: &str, params: F) -> Result<libsql::Rows, DatabaseError>
    where
        P: IntoParams,
        F: Fn() -> P,
    {
        let _gate = self.statement_gate().await;
        let conn = self.conn();
        let mut attempt = 1;
        loop {
            match conn.query(sql, params()).await {
                Ok(rows) => return Ok(rows),
                Err(e) if retry::is_transient(&e) && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, error = %e, "transient lock, retrying query");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Per-connection settings. `SQLite` does not persist these in the file.
async fn configure(conn: &Connection, busy_timeout: Duration) -> Result<(), DatabaseError> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute("PRAGMA foreign_keys = ON", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;
    Ok(())
}
