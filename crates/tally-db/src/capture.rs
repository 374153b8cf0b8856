//! Change capture.
//!
//! A monitored table has a row in `_tally_capture_bindings` naming its key
//! column and audit relation. Every mutation path of [`LibsqlStore`] looks the
//! binding up inside its write transaction and, when present, hands each
//! affected row to a [`ChangeRecorder`] as an explicit [`ChangeContext`]. The
//! audit row is written in the same transaction, so a failed audit write rolls
//! the mutation back.
//!
//! `monitor` also installs guard triggers on the table and its audit relation.
//! They abort any write made outside a recorder session, so other connections
//! and other clients cannot change a monitored table or forge audit rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{AuditRecord, ChangeContext, Ident, PendingAudit, QualifiedName, sql};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::helpers::parse_datetime;
use crate::store::SchemaCatalog;
use crate::{LibsqlStore, finish};

/// Prefix of tally's own bookkeeping tables.
const INTERNAL_PREFIX: &str = "_tally_";

/// A persisted capture binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureBinding {
    pub table: QualifiedName,
    pub key_column: Ident,
    pub audit_table: QualifiedName,
    pub created_at: DateTime<Utc>,
}

/// Writes audit rows for one monitored table.
#[derive(Debug, Clone)]
pub struct ChangeRecorder {
    subject: QualifiedName,
    key: Ident,
    audit: QualifiedName,
}

impl ChangeRecorder {
    #[must_use]
    pub const fn new(subject: QualifiedName, key: Ident, audit: QualifiedName) -> Self {
        Self { subject, key, audit }
    }

    #[must_use]
    pub const fn key_column(&self) -> &Ident {
        &self.key
    }

    #[must_use]
    pub const fn audit_table(&self) -> &QualifiedName {
        &self.audit
    }

    /// Lift the guard triggers of the subject on `conn` until
    /// [`close_session`](Self::close_session) or the end of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::AuditWriteFailure` if the session row cannot be written.
    pub async fn open_session(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        conn.execute(
            sql::open_capture_session(&self.subject).as_str(),
            [self.subject.table.as_str()],
        )
        .await
        .map_err(|e| self.write_failure(e.into()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::AuditWriteFailure` if the session row cannot be removed.
    pub async fn close_session(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        conn.execute(
            sql::close_capture_session(&self.subject).as_str(),
            [self.subject.table.as_str()],
        )
        .await
        .map_err(|e| self.write_failure(e.into()))?;
        Ok(())
    }

    fn write_failure(&self, source: DatabaseError) -> DatabaseError {
        DatabaseError::AuditWriteFailure {
            table: self.subject.to_string(),
            source: Box::new(source),
        }
    }

    /// Append the audit row for `change` on `conn`, which must be the
    /// connection (or transaction) carrying the change itself.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::AuditWriteFailure` for any failure, including
    /// a key value that is not an integer.
    pub async fn record(
        &self,
        conn: &libsql::Connection,
        change: &ChangeContext,
    ) -> Result<AuditRecord, DatabaseError> {
        self.append(conn, change)
            .await
            .map_err(|e| self.write_failure(e))
    }

    async fn append(
        &self,
        conn: &libsql::Connection,
        change: &ChangeContext,
    ) -> Result<AuditRecord, DatabaseError> {
        let pending = PendingAudit::from_change(change, &self.key)?;
        let mut rows = conn
            .query(
                sql::insert_audit(&self.audit).as_str(),
                libsql::params![
                    pending.subject_id,
                    pending.operation.as_str(),
                    pending.old_image.as_deref(),
                    pending.new_image.as_deref()
                ],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        let log_id = row.get::<i64>(0)?;
        let captured_at = parse_datetime(&row.get::<String>(1)?)?;
        // Step to completion so the insert is finalized.
        while rows.next().await?.is_some() {}

        debug!(table = %self.subject, log_id, operation = %pending.operation, "audit row appended");
        Ok(AuditRecord {
            log_id,
            subject_id: pending.subject_id,
            operation: pending.operation,
            old_image: change.old().cloned(),
            new_image: change.new_image().cloned(),
            captured_at,
        })
    }
}

impl LibsqlStore {
    /// Start capturing changes of `table`, keyed by `key`.
    ///
    /// Creates the audit relation `<table><audit_suffix>` if needed and
    /// installs the guard triggers. Calling it again replaces the binding.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the table or column does not exist or the table
    /// belongs to change capture itself, `ConflictTargetMissing` if the key is
    /// not unique, `NameCollision` if the audit name is taken by an ordinary table.
    pub async fn monitor(
        &self,
        table: &QualifiedName,
        key: &Ident,
        audit_suffix: &str,
    ) -> Result<CaptureBinding, DatabaseError> {
        if self.is_capture_owned(table).await? {
            return Err(capture_owned(table));
        }
        let shape = self
            .describe(table)
            .await?
            .ok_or_else(|| DatabaseError::InvalidInput(format!("table {table} does not exist")))?;
        if !shape.has_column(key) {
            return Err(DatabaseError::InvalidInput(format!("{table} has no column {key}")));
        }
        if !shape.has_unique_key(key) {
            return Err(DatabaseError::ConflictTargetMissing {
                table: table.to_string(),
                column: key.to_string(),
            });
        }
        let audit = table.sibling(Ident::new(format!("{}{audit_suffix}", table.table))?);
        if self.table_exists(&audit).await? && !self.is_capture_owned(&audit).await? {
            return Err(DatabaseError::NameCollision {
                table: audit.to_string(),
            });
        }

        let tx = self.write_tx().await?;
        let result = async {
            for statement in sql::create_audit_relation(&audit)
                .into_iter()
                .chain(sql::create_capture_guards(table, &audit))
            {
                tx.execute(statement.as_str(), ()).await?;
            }
            tx.execute(
                "INSERT INTO _tally_audit_relations (schema_name, table_name, subject_table)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (schema_name, table_name) DO NOTHING",
                libsql::params![audit.schema.as_str(), audit.table.as_str(), table.table.as_str()],
            )
            .await?;
            tx.execute(
                "INSERT INTO _tally_capture_bindings (schema_name, table_name, key_column, audit_table)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (schema_name, table_name) DO UPDATE SET
                     key_column = excluded.key_column,
                     audit_table = excluded.audit_table",
                libsql::params![
                    table.schema.as_str(),
                    table.table.as_str(),
                    key.as_str(),
                    audit.table.as_str()
                ],
            )
            .await?;
            find_binding(&tx, table).await?.ok_or(DatabaseError::NoResult)
        }
        .await;
        let binding = finish(tx, result).await?;
        info!(%table, key = %key, audit = %binding.audit_table, "monitoring table");
        Ok(binding)
    }

    /// Stop capturing changes of `table` and remove its guard triggers. The
    /// audit relation is kept, and stays protected. Returns whether a binding
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the delete fails.
    pub async fn unmonitor(&self, table: &QualifiedName) -> Result<bool, DatabaseError> {
        let tx = self.write_tx().await?;
        let result = async {
            let removed = delete_binding(&tx, table).await?;
            for statement in sql::drop_capture_guards(table) {
                tx.execute(statement.as_str(), ()).await?;
            }
            Ok(removed)
        }
        .await;
        let removed = finish(tx, result).await?;
        if removed {
            info!(%table, "stopped monitoring table");
        }
        Ok(removed)
    }

    /// The binding of `table`, if monitored.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the lookup fails.
    pub async fn binding(&self, table: &QualifiedName) -> Result<Option<CaptureBinding>, DatabaseError> {
        find_binding(&self.connect().await?, table).await
    }
}

/// The recorder for `table` if it is monitored.
pub(crate) async fn recorder_for(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<Option<ChangeRecorder>, DatabaseError> {
    Ok(find_binding(conn, table)
        .await?
        .map(|b| ChangeRecorder::new(b.table, b.key_column, b.audit_table)))
}

/// Whether `table` is an audit relation or one of tally's bookkeeping tables.
pub(crate) async fn is_capture_owned(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<bool, DatabaseError> {
    if table.table.as_str().to_ascii_lowercase().starts_with(INTERNAL_PREFIX) {
        return Ok(true);
    }
    let mut rows = conn
        .query(
            "SELECT 1 FROM _tally_audit_relations WHERE schema_name = ?1 AND table_name = ?2",
            libsql::params![table.schema.as_str(), table.table.as_str()],
        )
        .await?;
    Ok(rows.next().await?.is_some())
}

/// The refusal returned when an operation targets a capture-owned table.
pub(crate) fn capture_owned(table: &QualifiedName) -> DatabaseError {
    DatabaseError::InvalidInput(format!(
        "{table} belongs to change capture and cannot be written or dropped"
    ))
}

pub(crate) async fn find_binding(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<Option<CaptureBinding>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT key_column, audit_table, created_at FROM _tally_capture_bindings
             WHERE schema_name = ?1 AND table_name = ?2",
            libsql::params![table.schema.as_str(), table.table.as_str()],
        )
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    Ok(Some(CaptureBinding {
        table: table.clone(),
        key_column: Ident::new(row.get::<String>(0)?)?,
        audit_table: table.sibling(Ident::new(row.get::<String>(1)?)?),
        created_at: parse_datetime(&row.get::<String>(2)?)?,
    }))
}

pub(crate) async fn delete_binding(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<bool, DatabaseError> {
    let removed = conn
        .execute(
            "DELETE FROM _tally_capture_bindings WHERE schema_name = ?1 AND table_name = ?2",
            libsql::params![table.schema.as_str(), table.table.as_str()],
        )
        .await?;
    Ok(removed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tally_core::{OperationKind, RowImage};

    async fn store_with_people() -> LibsqlStore {
        let store = LibsqlStore::open_local(":memory:", 1000).await.unwrap();
        store
            .connect()
            .await
            .unwrap()
            .execute_batch(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT);
                 CREATE TABLE loose (id TEXT, name TEXT);",
            )
            .await
            .unwrap();
        store
    }

    fn name(table: &str) -> QualifiedName {
        QualifiedName::parse("main", table).unwrap()
    }

    fn image(value: serde_json::Value) -> RowImage {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn monitor_persists_binding() {
        let store = store_with_people().await;
        let key = Ident::new("id").unwrap();

        let binding = store.monitor(&name("people"), &key, "_audit").await.unwrap();

        assert_eq!(binding.audit_table, name("people_audit"));
        assert_eq!(binding.key_column, key);
        assert_eq!(store.binding(&name("people")).await.unwrap(), Some(binding));
        assert!(store.binding(&name("loose")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn monitor_requires_unique_key() {
        let store = store_with_people().await;
        let err = store
            .monitor(&name("loose"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::ConflictTargetMissing { .. }));

        let err = store
            .monitor(&name("people"), &Ident::new("email").unwrap(), "_audit")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unmonitor_keeps_audit_relation() {
        let store = store_with_people().await;
        store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap();

        assert!(store.unmonitor(&name("people")).await.unwrap());
        assert!(!store.unmonitor(&name("people")).await.unwrap());
        assert!(store.table_exists(&name("people_audit")).await.unwrap());
    }

    #[tokio::test]
    async fn records_each_kind_with_its_images() {
        let store = store_with_people().await;
        store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap();
        let tx = store.write_tx().await.unwrap();
        let recorder = recorder_for(&tx, &name("people")).await.unwrap().unwrap();
        recorder.open_session(&tx).await.unwrap();

        let old = image(json!({"id": 5, "name": "X"}));
        let new = image(json!({"id": 5, "name": "Y"}));
        let inserted = recorder
            .record(&tx, &ChangeContext::Insert { new: new.clone() })
            .await
            .unwrap();
        let updated = recorder
            .record(&tx, &ChangeContext::Update { old: old.clone(), new })
            .await
            .unwrap();
        let deleted = recorder
            .record(&tx, &ChangeContext::Delete { old })
            .await
            .unwrap();
        recorder.close_session(&tx).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(inserted.operation, OperationKind::Insert);
        assert_eq!(updated.operation, OperationKind::Update);
        assert_eq!(deleted.operation, OperationKind::Delete);
        assert!(inserted.log_id < updated.log_id && updated.log_id < deleted.log_id);
        for record in [&inserted, &updated, &deleted] {
            assert_eq!(record.subject_id, 5);
            assert!(record.images_consistent());
        }
        assert_eq!(count(&store, "_tally_capture_session").await, 0);
    }

    #[tokio::test]
    async fn non_integer_key_is_an_audit_write_failure() {
        let store = store_with_people().await;
        store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap();
        let conn = store.connect().await.unwrap();
        let recorder = recorder_for(&conn, &name("people")).await.unwrap().unwrap();

        let err = recorder
            .record(
                &conn,
                &ChangeContext::Insert {
                    new: image(json!({"id": "abc", "name": "Z"})),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AuditWriteFailure { .. }));
    }

    async fn count(store: &LibsqlStore, table: &str) -> i64 {
        let mut rows = store
            .connect()
            .await
            .unwrap()
            .query(&format!("SELECT count(*) FROM {table}"), ())
            .await
            .unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test]
    async fn writes_outside_the_recorder_are_refused() {
        let store = store_with_people().await;
        let conn = store.connect().await.unwrap();
        conn.execute("INSERT INTO people (id, name) VALUES (5, 'X'), (6, 'Y')", ())
            .await
            .unwrap();
        store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap();

        for statement in [
            "DELETE FROM people WHERE id = 5",
            "UPDATE people SET name = 'Z' WHERE id = 6",
            "INSERT INTO people (id, name) VALUES (7, 'W')",
            "INSERT INTO people_audit (subject_id, operation, new_image) VALUES (900, 'INSERT', '{}')",
        ] {
            let err = conn.execute(statement, ()).await.unwrap_err();
            assert!(err.to_string().contains("change recorder"), "{statement}: {err}");
        }
        assert_eq!(count(&store, "people").await, 2);
        assert_eq!(count(&store, "people_audit").await, 0);
    }

    #[tokio::test]
    async fn unmonitor_lifts_the_table_guards_only() {
        let store = store_with_people().await;
        store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap();
        store.unmonitor(&name("people")).await.unwrap();

        let conn = store.connect().await.unwrap();
        conn.execute("INSERT INTO people (id, name) VALUES (1, 'A')", ())
            .await
            .unwrap();
        assert!(
            conn.execute(
                "INSERT INTO people_audit (subject_id, operation, new_image) VALUES (1, 'INSERT', '{}')",
                ()
            )
            .await
            .is_err()
        );
    }

    #[tokio::test]
    async fn audit_relations_cannot_be_monitored() {
        let store = store_with_people().await;
        let key = Ident::new("id").unwrap();
        store.monitor(&name("people"), &key, "_audit").await.unwrap();

        let err = store
            .monitor(&name("people_audit"), &Ident::new("log_id").unwrap(), "_audit")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)), "{err}");
        let err = store
            .monitor(&name("_tally_capture_bindings"), &key, "_audit")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)), "{err}");
    }

    #[tokio::test]
    async fn audit_name_taken_by_an_ordinary_table_collides() {
        let store = store_with_people().await;
        store
            .connect()
            .await
            .unwrap()
            .execute("CREATE TABLE people_log (note TEXT)", ())
            .await
            .unwrap();

        let err = store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_log")
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NameCollision { .. }), "{err}");
        assert!(store.binding(&name("people")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn audit_relation_is_append_only() {
        let store = store_with_people().await;
        store
            .monitor(&name("people"), &Ident::new("id").unwrap(), "_audit")
            .await
            .unwrap();
        let tx = store.write_tx().await.unwrap();
        let recorder = recorder_for(&tx, &name("people")).await.unwrap().unwrap();
        recorder.open_session(&tx).await.unwrap();
        recorder
            .record(
                &tx,
                &ChangeContext::Insert {
                    new: image(json!({"id": 1, "name": "A"})),
                },
            )
            .await
            .unwrap();
        recorder.close_session(&tx).await.unwrap();
        tx.commit().await.unwrap();

        let conn = store.connect().await.unwrap();
        assert!(conn.execute("DELETE FROM people_audit", ()).await.is_err());
        assert!(
            conn.execute("UPDATE people_audit SET subject_id = 2", ())
                .await
                .is_err()
        );
    }
}
