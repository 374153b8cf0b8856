//! Schema inference: a delimited file becomes a new table.
//!
//! The header line names the columns (sanitized, all generically typed); the
//! data rows are then bulk-loaded. If loading fails the table created by this
//! call is dropped again. Creation and load are separate steps, so the drop
//! is a compensation, not a rollback.

use std::path::Path;

use serde::Serialize;
use tally_core::{Ident, QualifiedName, TableDefinition, header, sql};
use tracing::{info, warn};

use crate::capture::capture_owned;
use crate::cleanup::TableGuard;
use crate::error::DatabaseError;
use crate::helpers::error_message;
use crate::store::{SchemaCatalog, TableStore};

#[derive(Debug, Clone)]
pub struct InferRequest<'a> {
    pub source: &'a Path,
    /// Table name override; sanitized. Defaults to the file stem.
    pub table: Option<&'a str>,
    pub delimiter: char,
    pub drop_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferReport {
    pub table: String,
    pub columns: Vec<String>,
    pub rows_loaded: u64,
    pub dropped_existing: bool,
}

pub struct SchemaInference<S> {
    store: S,
    schema: Ident,
}

impl<S> SchemaInference<S>
where
    S: SchemaCatalog + TableStore + Clone + Send + Sync + 'static,
{
    pub const fn new(store: S, schema: Ident) -> Self {
        Self { store, schema }
    }

    /// The table name a request resolves to.
    #[must_use]
    pub fn table_name(&self, request: &InferRequest<'_>) -> QualifiedName {
        let table = request
            .table
            .map_or_else(|| Ident::from_file_stem(request.source), Ident::sanitized);
        QualifiedName::new(self.schema.clone(), table)
    }

    /// Create a table from the file's header and load its data rows.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an unreadable file, a bad header, a non-ASCII
    ///   delimiter, or a name that resolves to a capture-owned table
    /// - `NameCollision` if the table exists and dropping was not requested
    /// - `LoadFailure` if a data row cannot be loaded; the new table is dropped
    ///   again, and a failure to drop it is attached as `WithCleanupFailure`
    pub async fn infer_and_load(&self, request: &InferRequest<'_>) -> Result<InferReport, DatabaseError> {
        let delimiter = u8::try_from(request.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                DatabaseError::InvalidInput(format!(
                    "delimiter {:?} is not a single ASCII character",
                    request.delimiter
                ))
            })?;
        let headers = header::read_header(request.source, request.delimiter)?;
        let definition = TableDefinition::from_headers(self.table_name(request), headers)?;
        let table = definition.name.clone();
        if self.store.is_capture_owned(&table).await? {
            return Err(capture_owned(&table));
        }

        let mut dropped_existing = false;
        if self.store.table_exists(&table).await? {
            if !request.drop_existing {
                return Err(DatabaseError::NameCollision {
                    table: table.to_string(),
                });
            }
            self.store.drop_table(&table).await?;
            dropped_existing = true;
            info!(%table, "dropped existing table");
        }

        self.store
            .execute(&sql::create_table(&definition))
            .await
            .map_err(|e| name_collision(e, &table))?;
        let guard = TableGuard::new(&self.store, table.clone());

        match self.store.bulk_copy(&table, request.source, delimiter).await {
            Ok(rows_loaded) => {
                guard.disarm();
                info!(%table, columns = definition.columns.len(), rows_loaded, "table inferred and loaded");
                Ok(InferReport {
                    table: table.to_string(),
                    columns: definition.column_names().map(ToString::to_string).collect(),
                    rows_loaded,
                    dropped_existing,
                })
            }
            Err(e) => match guard.release().await {
                Ok(()) => Err(e),
                Err(cleanup) => {
                    warn!(%table, error = %cleanup, "failed to drop table after load failure");
                    Err(e.with_cleanup(cleanup))
                }
            },
        }
    }
}

fn name_collision(err: DatabaseError, table: &QualifiedName) -> DatabaseError {
    match err {
        DatabaseError::LibSql(e) if error_message(&e).contains("already exists") => {
            DatabaseError::NameCollision {
                table: table.to_string(),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{Fail, FakeStore};
    use crate::{AuditFilter, LibsqlStore};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    async fn engine() -> (SchemaInference<LibsqlStore>, LibsqlStore) {
        let store = LibsqlStore::open_local(":memory:", 1000).await.unwrap();
        (SchemaInference::new(store.clone(), Ident::new("main").unwrap()), store)
    }

    fn csv_named(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        path
    }

    fn request(path: &Path) -> InferRequest<'_> {
        InferRequest {
            source: path,
            table: None,
            delimiter: ',',
            drop_existing: false,
        }
    }

    #[tokio::test]
    async fn table_named_after_sanitized_file_stem() {
        let (engine, _) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "2024 sales-q1.csv", "a\n1\n");

        let report = engine.infer_and_load(&request(&path)).await.unwrap();
        assert_eq!(report.table, "main._2024_sales_q1");
    }

    #[tokio::test]
    async fn override_is_sanitized() {
        let (engine, _) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "x.csv", "a\n1\n");
        let mut req = request(&path);
        req.table = Some("my table");

        let report = engine.infer_and_load(&req).await.unwrap();
        assert_eq!(report.table, "main.my_table");
    }

    #[tokio::test]
    async fn existing_table_collides_unless_dropped() {
        let (engine, store) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "people.csv", "id,name\n1,Ann\n");
        engine.infer_and_load(&request(&path)).await.unwrap();

        let err = engine.infer_and_load(&request(&path)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameCollision);

        let mut req = request(&path);
        req.drop_existing = true;
        let report = engine.infer_and_load(&req).await.unwrap();
        assert!(report.dropped_existing);
        assert_eq!(report.rows_loaded, 1);

        let table = QualifiedName::parse("main", "people").unwrap();
        assert!(store.table_exists(&table).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_sanitized_headers_are_rejected() {
        let (engine, store) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "dup.csv", "first name,first_name\na,b\n");

        let err = engine.infer_and_load(&request(&path)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let table = QualifiedName::parse("main", "dup").unwrap();
        assert!(!store.table_exists(&table).await.unwrap());
    }

    #[tokio::test]
    async fn non_ascii_delimiter_is_rejected() {
        let (engine, _) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "x.csv", "a\n");
        let mut req = request(&path);
        req.delimiter = '§';
        let err = engine.infer_and_load(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn quoted_header_field_may_contain_the_delimiter() {
        let (engine, _) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "names.csv", "\"last, first\",id\n\"Doe, Jane\",1\n");

        let report = engine.infer_and_load(&request(&path)).await.unwrap();
        assert_eq!(report.columns, ["last__first", "id"]);
        assert_eq!(report.rows_loaded, 1);
    }

    #[tokio::test]
    async fn audit_relation_is_never_replaced() {
        let (engine, store) = engine().await;
        let dir = tempfile::TempDir::new().unwrap();
        let people = csv_named(&dir, "people.csv", "id,name\n1,Ann\n");
        engine.infer_and_load(&request(&people)).await.unwrap();
        let table = QualifiedName::parse("main", "people").unwrap();
        let id = Ident::new("id").unwrap();
        store.add_unique_key(&table, &id).await.unwrap();
        store.monitor(&table, &id, "_audit").await.unwrap();
        let values = [
            (id.clone(), serde_json::json!(2)),
            (Ident::new("name").unwrap(), serde_json::json!("Bob")),
        ];
        store.insert_row(&table, &values).await.unwrap();

        let forged = csv_named(&dir, "people_audit.csv", "log_id,subject_id\n900,5\n");
        let mut req = request(&forged);
        req.drop_existing = true;
        let err = engine.infer_and_load(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let bindings = csv_named(&dir, "x.csv", "a\n1\n");
        let mut req = request(&bindings);
        req.table = Some("_tally_capture_bindings");
        req.drop_existing = true;
        assert_eq!(engine.infer_and_load(&req).await.unwrap_err().kind(), ErrorKind::InvalidInput);

        let records = store.query_audit(&table, &AuditFilter::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject_id, 2);
    }

    #[tokio::test]
    async fn cancelled_inference_drops_the_new_table_in_background() {
        let store = FakeStore::new(None, Fail::HangInLoad);
        let engine = SchemaInference::new(store.clone(), Ident::new("main").unwrap());
        let dir = tempfile::TempDir::new().unwrap();
        let path = csv_named(&dir, "people.csv", "id,name\n1,Ann\n");

        let req = request(&path);
        let outcome = tokio::time::timeout(Duration::from_millis(50), engine.infer_and_load(&req)).await;
        assert!(outcome.is_err(), "inference should still be pending");

        for _ in 0..50 {
            if store.log().iter().any(|l| l == "drop main.people") {
                let log = store.log();
                assert!(log[0].starts_with("execute CREATE TABLE \"main\".\"people\""));
                assert_eq!(log[1], "load main.people");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("table was not dropped: {:?}", store.log());
    }
}
