//! # tally-db
//!
//! libSQL store operations for tally.
//!
//! Turns delimited files into tables (schema inference + bulk load), merges
//! later extracts into those tables through a staging relation (upsert), and
//! records every row-level change of a monitored table into an append-only
//! audit relation in the same transaction as the change.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29) for local database files.

pub mod audit;
pub mod capture;
mod catalog;
mod cleanup;
pub mod error;
pub mod helpers;
pub mod infer;
mod loader;
mod migrations;
pub mod rows;
pub mod store;
#[cfg(test)]
mod test_support;
pub mod upsert;

pub use audit::AuditFilter;
pub use capture::{CaptureBinding, ChangeRecorder};
pub use error::{DatabaseError, ErrorKind};
pub use infer::{InferReport, InferRequest, SchemaInference};
pub use store::{SchemaCatalog, TableStore};
pub use upsert::{MergeOutcome, UpsertPlan, UpsertPlanner, UpsertReport};

use std::sync::Arc;

use libsql::{Builder, TransactionBehavior};
use tally_config::DatabaseConfig;
use tracing::warn;

const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// Central store handle.
///
/// Cheap to clone. Every operation opens its own connection from the shared
/// database, except for `:memory:` databases, where all clones share one
/// connection (a second connection would see a different, empty database).
#[derive(Clone)]
pub struct LibsqlStore {
    db: Arc<libsql::Database>,
    shared: Option<libsql::Connection>,
    busy_timeout_ms: u64,
    batch_size: usize,
    audit_limit: u32,
}

impl LibsqlStore {
    /// Open the database described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Self::open_local(&config.path, config.busy_timeout_ms).await
    }

    /// Open a local database file (or `:memory:`).
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let shared = if path == ":memory:" {
            let conn = db.connect()?;
            configure(&conn, busy_timeout_ms).await?;
            Some(conn)
        } else {
            None
        };

        let store = Self {
            db: Arc::new(db),
            shared,
            busy_timeout_ms,
            batch_size: DEFAULT_BATCH_SIZE,
            audit_limit: DEFAULT_AUDIT_LIMIT,
        };
        let conn = store.connect().await?;
        migrations::run_migrations(&conn).await?;
        Ok(store)
    }

    /// Set how many parsed rows the loader buffers per batch.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Set how many audit records a query returns when its filter sets no limit.
    #[must_use]
    pub fn with_audit_limit(mut self, limit: u32) -> Self {
        self.audit_limit = limit.max(1);
        self
    }

    #[must_use]
    pub const fn audit_limit(&self) -> u32 {
        self.audit_limit
    }

    /// A configured connection for direct queries.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the connection cannot be opened.
    pub async fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        if let Some(conn) = &self.shared {
            return Ok(conn.clone());
        }
        let conn = self.db.connect()?;
        configure(&conn, self.busy_timeout_ms).await?;
        Ok(conn)
    }

    /// Begin an IMMEDIATE transaction on a fresh connection: the write lock is
    /// taken up front so reads of pre-images and the mutation see the same data.
    pub(crate) async fn write_tx(&self) -> Result<libsql::Transaction, DatabaseError> {
        let conn = self.connect().await?;
        Ok(conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?)
    }
}

/// Commit on success, roll back on failure. A failed rollback is logged; the
/// original error is returned either way.
pub(crate) async fn finish<T>(
    tx: libsql::Transaction,
    result: Result<T, DatabaseError>,
) -> Result<T, DatabaseError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn configure(conn: &libsql::Connection, busy_timeout_ms: u64) -> Result<(), DatabaseError> {
    conn.query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"), ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA busy_timeout: {e}")))?;
    conn.execute("PRAGMA foreign_keys = ON", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> LibsqlStore {
        LibsqlStore::open_local(":memory:", 1000).await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_binding_table() {
        let store = test_store().await;
        let conn = store.connect().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                ["_tally_capture_bindings"],
            )
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let store = test_store().await;
        let conn = store.connect().await.unwrap();
        migrations::run_migrations(&conn).await.unwrap();
        migrations::run_migrations(&conn).await.unwrap();
    }

    #[tokio::test]
    async fn memory_clones_share_one_database() {
        let store = test_store().await;
        let clone = store.clone();
        store
            .connect()
            .await
            .unwrap()
            .execute("CREATE TABLE shared_check (x TEXT)", ())
            .await
            .unwrap();
        let mut rows = clone
            .connect()
            .await
            .unwrap()
            .query("SELECT count(*) FROM shared_check", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);
    }

    #[tokio::test]
    async fn file_connections_see_each_others_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tally.db");
        let store = LibsqlStore::open_local(path.to_str().unwrap(), 1000)
            .await
            .unwrap();

        store
            .connect()
            .await
            .unwrap()
            .execute("CREATE TABLE seen (x TEXT)", ())
            .await
            .unwrap();
        let mut rows = store
            .connect()
            .await
            .unwrap()
            .query("SELECT name FROM sqlite_master WHERE name = 'seen'", ())
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn open_local_creates_audit_registry() {
        let store = test_store().await;
        let conn = store.connect().await.unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                ["_tally_audit_relations"],
            )
            .await
            .unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn audit_limit_is_at_least_one() {
        let store = test_store().await;
        assert_eq!(store.audit_limit(), 50);
        assert_eq!(store.with_audit_limit(0).audit_limit(), 1);
    }

    #[tokio::test]
    async fn batch_size_is_at_least_one() {
        let store = test_store().await.with_batch_size(0);
        assert_eq!(store.batch_size(), 1);
    }
}
