//! Upsert planner.
//!
//! Merges an extract into an existing table through a staging relation:
//! describe target → create staging like target → load file into staging →
//! re-read the target's columns → one `INSERT ... ON CONFLICT DO UPDATE` →
//! drop staging. The last writer wins; no locking beyond the store's own.

use std::path::Path;

use serde::Serialize;
use tally_core::{Ident, QualifiedName, Statement, sql};
use tracing::{info, warn};

use crate::capture::capture_owned;
use crate::cleanup::TableGuard;
use crate::error::DatabaseError;
use crate::store::{SchemaCatalog, TableStore};

/// Everything one merge needs, built from live catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPlan {
    pub target: QualifiedName,
    pub staging: QualifiedName,
    pub key: Ident,
    pub columns: Vec<Ident>,
    pub non_key: Vec<Ident>,
    pub statement: Statement,
}

impl UpsertPlan {
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidInput` if `key` is not among `columns`.
    pub fn build(
        target: QualifiedName,
        staging: QualifiedName,
        key: Ident,
        columns: Vec<Ident>,
    ) -> Result<Self, DatabaseError> {
        if !columns.contains(&key) {
            return Err(DatabaseError::InvalidInput(format!("{target} has no column {key}")));
        }
        let non_key: Vec<Ident> = columns.iter().filter(|c| **c != key).cloned().collect();
        let statement = sql::upsert_from(&target, &staging, &columns, &key, &non_key);
        Ok(Self {
            target,
            staging,
            key,
            columns,
            non_key,
            statement,
        })
    }
}

/// Rows written by one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub inserted: u64,
    pub updated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub target: String,
    pub staging: String,
    pub rows_staged: u64,
    pub inserted: u64,
    pub updated: u64,
    /// False if the staging relation could not be dropped after a successful merge.
    pub staging_dropped: bool,
}

pub struct UpsertPlanner<S> {
    store: S,
    staging_prefix: Ident,
}

impl<S> UpsertPlanner<S>
where
    S: SchemaCatalog + TableStore + Clone + Send + Sync + 'static,
{
    pub const fn new(store: S, staging_prefix: Ident) -> Self {
        Self {
            store,
            staging_prefix,
        }
    }

    /// Merge every data row of `source` into `target`, matching on `key`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the target or key column does not exist, or the
    ///   target is capture-owned
    /// - `ConflictTargetMissing` if `key` carries no uniqueness constraint
    /// - `LoadFailure` if the file cannot be staged
    /// - `AuditWriteFailure` if the target is monitored and a change cannot be recorded
    ///
    /// A failure to drop staging after any of these is attached as
    /// `WithCleanupFailure`.
    pub async fn upsert(
        &self,
        target: &QualifiedName,
        key: &Ident,
        source: &Path,
        delimiter: u8,
    ) -> Result<UpsertReport, DatabaseError> {
        if self.store.is_capture_owned(target).await? {
            return Err(capture_owned(target));
        }
        let shape = self
            .store
            .describe(target)
            .await?
            .ok_or_else(|| DatabaseError::InvalidInput(format!("table {target} does not exist")))?;
        if !shape.has_column(key) {
            return Err(DatabaseError::InvalidInput(format!("{target} has no column {key}")));
        }
        if !shape.has_unique_key(key) {
            return Err(DatabaseError::ConflictTargetMissing {
                table: target.to_string(),
                column: key.to_string(),
            });
        }

        let staging = target.sibling(self.staging_name(&target.table)?);
        let mut statements = sql::create_table_like(&shape, &staging)?.into_iter();
        if let Some(create) = statements.next() {
            self.store.execute(&create).await?;
        }
        let guard = TableGuard::new(&self.store, staging.clone());

        let result = self.stage_and_merge(target, key, source, delimiter, guard.table(), statements).await;
        let cleanup = guard.release().await;

        match (result, cleanup) {
            (Ok((rows_staged, outcome)), cleanup) => {
                if let Err(e) = &cleanup {
                    warn!(%staging, error = %e, "failed to drop staging relation");
                }
                info!(
                    table = %target,
                    rows_staged,
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    "upsert complete"
                );
                Ok(UpsertReport {
                    target: target.to_string(),
                    staging: staging.to_string(),
                    rows_staged,
                    inserted: outcome.inserted,
                    updated: outcome.updated,
                    staging_dropped: cleanup.is_ok(),
                })
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => Err(e.with_cleanup(cleanup)),
        }
    }

    async fn stage_and_merge(
        &self,
        target: &QualifiedName,
        key: &Ident,
        source: &Path,
        delimiter: u8,
        staging: &QualifiedName,
        indexes: impl Iterator<Item = Statement> + Send,
    ) -> Result<(u64, MergeOutcome), DatabaseError> {
        for statement in indexes {
            self.store.execute(&statement).await?;
        }
        let rows_staged = self.store.bulk_copy(staging, source, delimiter).await?;

        // The target may have changed since it was described.
        let columns = self.store.column_names(target).await?;
        let plan = UpsertPlan::build(target.clone(), staging.clone(), key.clone(), columns)?;
        let outcome = self.store.merge(&plan).await?;
        Ok((rows_staged, outcome))
    }

    /// `<prefix>_<table>_<8 hex>`.
    fn staging_name(&self, table: &Ident) -> Result<Ident, DatabaseError> {
        let mut bytes = [0_u8; 4];
        getrandom::fill(&mut bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate staging suffix: {e}"))?;
        let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Ok(Ident::new(format!("{}_{table}_{suffix}", self.staging_prefix))?)
    }
}
