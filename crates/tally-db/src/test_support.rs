//! In-crate test doubles for the store capabilities.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tally_core::{Ident, QualifiedName, Statement, TableShape};

use crate::capture::capture_owned;
use crate::error::DatabaseError;
use crate::store::{SchemaCatalog, TableStore};
use crate::upsert::{MergeOutcome, UpsertPlan};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fail {
    Nothing,
    Load,
    Merge,
    MergeAndDrop,
    DropOnly,
    HangInLoad,
}

/// Catalog and store double that records every call.
#[derive(Clone)]
pub(crate) struct FakeStore {
    shape: Option<TableShape>,
    fail: Fail,
    protected: Vec<QualifiedName>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeStore {
    pub(crate) fn new(shape: Option<TableShape>, fail: Fail) -> Self {
        Self {
            shape,
            fail,
            protected: Vec::new(),
            log: Arc::default(),
        }
    }

    /// Treat `table` as capture-owned.
    pub(crate) fn protecting(mut self, table: QualifiedName) -> Self {
        self.protected.push(table);
        self
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl SchemaCatalog for FakeStore {
    async fn table_exists(&self, _table: &QualifiedName) -> Result<bool, DatabaseError> {
        Ok(self.shape.is_some())
    }

    async fn column_names(&self, _table: &QualifiedName) -> Result<Vec<Ident>, DatabaseError> {
        let mut columns: Vec<Ident> = self
            .shape
            .iter()
            .flat_map(|s| s.columns.iter().map(|c| c.name.clone()))
            .collect();
        // Simulates a column added after the target was described.
        columns.push(Ident::new("added_later").unwrap());
        Ok(columns)
    }

    async fn describe(&self, _table: &QualifiedName) -> Result<Option<TableShape>, DatabaseError> {
        Ok(self.shape.clone())
    }

    async fn is_capture_owned(&self, table: &QualifiedName) -> Result<bool, DatabaseError> {
        Ok(self.protected.contains(table))
    }
}

impl TableStore for FakeStore {
    async fn execute(&self, statement: &Statement) -> Result<(), DatabaseError> {
        self.push(format!("execute {statement}"));
        Ok(())
    }

    async fn drop_table(&self, table: &QualifiedName) -> Result<(), DatabaseError> {
        if self.protected.contains(table) {
            return Err(capture_owned(table));
        }
        self.push(format!("drop {table}"));
        if matches!(self.fail, Fail::MergeAndDrop | Fail::DropOnly) {
            return Err(DatabaseError::Query("database is locked".into()));
        }
        Ok(())
    }

    async fn bulk_copy(
        &self,
        target: &QualifiedName,
        _source: &Path,
        _delimiter: u8,
    ) -> Result<u64, DatabaseError> {
        self.push(format!("load {target}"));
        match self.fail {
            Fail::Load => Err(DatabaseError::LoadFailure {
                relation: target.to_string(),
                line: Some(4),
                reason: "wrong field count".into(),
            }),
            Fail::HangInLoad => std::future::pending().await,
            _ => Ok(3),
        }
    }

    async fn merge(&self, plan: &UpsertPlan) -> Result<MergeOutcome, DatabaseError> {
        self.push(format!("merge {}", plan.statement));
        if matches!(self.fail, Fail::Merge | Fail::MergeAndDrop) {
            return Err(DatabaseError::Query("disk I/O error".into()));
        }
        Ok(MergeOutcome {
            inserted: 2,
            updated: 1,
        })
    }
}
