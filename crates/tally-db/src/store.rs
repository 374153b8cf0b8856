//! Store capabilities the engines depend on.
//!
//! [`SchemaInference`](crate::SchemaInference) and
//! [`UpsertPlanner`](crate::UpsertPlanner) are generic over these traits so
//! they can run against a fake in tests. [`LibsqlStore`] implements both.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use tally_core::{ChangeContext, Ident, QualifiedName, Statement, TableShape, sql};
use tracing::{debug, info};

use crate::capture;
use crate::error::DatabaseError;
use crate::helpers::{collect_images, error_message};
use crate::upsert::{MergeOutcome, UpsertPlan};
use crate::{LibsqlStore, finish, loader};

/// Read access to live table metadata.
pub trait SchemaCatalog {
    fn table_exists(
        &self,
        table: &QualifiedName,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    /// Column names in declaration order; empty if the table does not exist.
    fn column_names(
        &self,
        table: &QualifiedName,
    ) -> impl Future<Output = Result<Vec<Ident>, DatabaseError>> + Send;

    /// Full shape of a table, or `None` if it does not exist.
    fn describe(
        &self,
        table: &QualifiedName,
    ) -> impl Future<Output = Result<Option<TableShape>, DatabaseError>> + Send;

    /// Whether `table` is an audit relation or a tally bookkeeping table.
    /// Neither engine writes to or drops such a table.
    fn is_capture_owned(
        &self,
        table: &QualifiedName,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;
}

/// Write access: DDL, bulk loads, and merges.
pub trait TableStore {
    /// Execute one generated statement on its own connection.
    fn execute(&self, statement: &Statement) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Drop a table if it exists, together with any capture binding on it.
    /// Refuses capture-owned tables.
    fn drop_table(&self, table: &QualifiedName) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Load every data row of a delimited file into an existing table.
    /// Returns the number of rows loaded. Loads nothing on failure.
    fn bulk_copy(
        &self,
        target: &QualifiedName,
        source: &Path,
        delimiter: u8,
    ) -> impl Future<Output = Result<u64, DatabaseError>> + Send;

    /// Run a merge statement, capturing changes if the target is monitored.
    fn merge(&self, plan: &UpsertPlan) -> impl Future<Output = Result<MergeOutcome, DatabaseError>> + Send;
}

impl TableStore for LibsqlStore {
    async fn execute(&self, statement: &Statement) -> Result<(), DatabaseError> {
        debug!(%statement, "execute");
        let conn = self.connect().await?;
        conn.execute(statement.as_str(), ()).await?;
        Ok(())
    }

    async fn drop_table(&self, table: &QualifiedName) -> Result<(), DatabaseError> {
        if self.is_capture_owned(table).await? {
            return Err(capture::capture_owned(table));
        }
        let statement = sql::drop_table_if_exists(table);
        debug!(%statement, "drop");
        let tx = self.write_tx().await?;
        let result = async {
            tx.execute(statement.as_str(), ()).await?;
            capture::delete_binding(&tx, table).await?;
            Ok::<_, DatabaseError>(())
        }
        .await;
        finish(tx, result).await
    }

    async fn bulk_copy(
        &self,
        target: &QualifiedName,
        source: &Path,
        delimiter: u8,
    ) -> Result<u64, DatabaseError> {
        let conn = self.connect().await?;
        if capture::is_capture_owned(&conn, target).await? {
            return Err(capture::capture_owned(target));
        }
        if capture::find_binding(&conn, target).await?.is_some() {
            return Err(DatabaseError::InvalidInput(format!(
                "{target} is monitored; bulk loading would bypass change capture"
            )));
        }
        let columns = self.column_names(target).await?;
        if columns.is_empty() {
            return Err(DatabaseError::InvalidInput(format!("table {target} does not exist")));
        }
        let loaded = loader::load(&conn, target, &columns, source, delimiter, self.batch_size()).await?;
        info!(table = %target, rows = loaded, "bulk load complete");
        Ok(loaded)
    }

    async fn merge(&self, plan: &UpsertPlan) -> Result<MergeOutcome, DatabaseError> {
        if self.is_capture_owned(&plan.target).await? {
            return Err(capture::capture_owned(&plan.target));
        }
        debug!(statement = %plan.statement, "merge");
        let tx = self.write_tx().await?;
        let result = merge_in(&tx, plan).await;
        finish(tx, result).await
    }
}

/// The merge inside an open transaction: pre-images, the merge itself with
/// `RETURNING *`, then one change per written row.
///
/// Staging mirrors the target's unique indexes, so a key occurs at most once
/// among the staged rows; an extract repeating a key already failed to load.
async fn merge_in(tx: &libsql::Transaction, plan: &UpsertPlan) -> Result<MergeOutcome, DatabaseError> {
    let recorder = capture::recorder_for(tx, &plan.target).await?;
    if let Some(recorder) = &recorder {
        recorder.open_session(tx).await?;
    }

    let conflicting = sql::select_conflicting(&plan.target, &plan.staging, &plan.key);
    let mut prior = HashMap::new();
    for image in collect_images(tx.query(conflicting.as_str(), ()).await?).await? {
        if let Some(key) = image.pairing_key(&plan.key) {
            prior.insert(key, image);
        }
    }

    let rows = tx
        .query(plan.statement.as_str(), ())
        .await
        .map_err(|e| classify_merge_error(e, plan))?;
    let written = collect_images(rows)
        .await
        .map_err(|e| match e {
            DatabaseError::LibSql(e) => classify_merge_error(e, plan),
            other => other,
        })?;

    let mut outcome = MergeOutcome::default();
    for new in written {
        let old = new.pairing_key(&plan.key).and_then(|key| prior.remove(&key));
        let change = match old {
            Some(old) => {
                outcome.updated += 1;
                ChangeContext::Update { old, new }
            }
            None => {
                outcome.inserted += 1;
                ChangeContext::Insert { new }
            }
        };
        if let Some(recorder) = &recorder {
            recorder.record(tx, &change).await?;
        }
    }
    if let Some(recorder) = &recorder {
        recorder.close_session(tx).await?;
    }
    Ok(outcome)
}

fn classify_merge_error(err: libsql::Error, plan: &UpsertPlan) -> DatabaseError {
    let message = error_message(&err);
    if message.contains("ON CONFLICT clause does not match") {
        DatabaseError::ConflictTargetMissing {
            table: plan.target.to_string(),
            column: plan.key.to_string(),
        }
    } else {
        DatabaseError::LibSql(err)
    }
}

impl LibsqlStore {
    /// Make `column` usable as an upsert conflict target by adding a unique
    /// index on it. A no-op if that index already exists.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the table or column does not exist, the table is
    /// capture-owned, or the column already holds duplicate values.
    pub async fn add_unique_key(&self, table: &QualifiedName, column: &Ident) -> Result<(), DatabaseError> {
        if self.is_capture_owned(table).await? {
            return Err(capture::capture_owned(table));
        }
        let shape = self
            .describe(table)
            .await?
            .ok_or_else(|| DatabaseError::InvalidInput(format!("table {table} does not exist")))?;
        if !shape.has_column(column) {
            return Err(DatabaseError::InvalidInput(format!("{table} has no column {column}")));
        }
        self.execute(&sql::create_unique_index(table, column))
            .await
            .map_err(|e| match e {
                DatabaseError::LibSql(e) if error_message(&e).contains("UNIQUE constraint failed") => {
                    DatabaseError::InvalidInput(format!("{table}.{column} has duplicate values"))
                }
                other => other,
            })?;
        info!(%table, %column, "unique key added");
        Ok(())
    }
}
