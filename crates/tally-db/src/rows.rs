//! Single-statement row mutations.
//!
//! Each runs in its own IMMEDIATE transaction and, when the table is
//! monitored, records one change per affected row inside a capture session
//! before committing. Capture-owned tables are refused.

use std::collections::HashMap;

use serde_json::Value as Json;
use tally_core::{ChangeContext, Ident, QualifiedName, RowImage, sql};
use tracing::{debug, info};

use crate::capture::{self, ChangeRecorder};
use crate::error::DatabaseError;
use crate::helpers::{collect_images, json_to_value};
use crate::{LibsqlStore, finish};

impl LibsqlStore {
    /// Insert one row. Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if no values are given or the table is capture-owned,
    /// `AuditWriteFailure` if the table is monitored and the change cannot be
    /// recorded.
    pub async fn insert_row(
        &self,
        table: &QualifiedName,
        values: &[(Ident, Json)],
    ) -> Result<u64, DatabaseError> {
        if values.is_empty() {
            return Err(DatabaseError::InvalidInput("insert needs at least one column".into()));
        }
        let columns: Vec<Ident> = values.iter().map(|(c, _)| c.clone()).collect();
        let statement = sql::insert_values_returning(table, &columns);
        debug!(%statement, "insert row");

        let tx = self.write_tx().await?;
        let result = async {
            let recorder = begin(&tx, table).await?;
            let rows = tx
                .query(
                    statement.as_str(),
                    libsql::params_from_iter(values.iter().map(|(_, v)| json_to_value(v))),
                )
                .await?;
            let written = collect_images(rows).await?;
            record_all(&tx, recorder.as_ref(), written.into_iter().map(|new| ChangeContext::Insert { new })).await
        }
        .await;
        let inserted = finish(tx, result).await?;
        info!(%table, rows = inserted, "inserted");
        Ok(inserted)
    }

    /// Update the rows whose `key` equals `key_value`. Returns the number of
    /// rows updated.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty assignment list or one that assigns the
    /// key column, `AuditWriteFailure` if the change cannot be recorded.
    pub async fn update_row(
        &self,
        table: &QualifiedName,
        key: &Ident,
        key_value: &Json,
        assignments: &[(Ident, Json)],
    ) -> Result<u64, DatabaseError> {
        if assignments.is_empty() {
            return Err(DatabaseError::InvalidInput("update needs at least one assignment".into()));
        }
        if assignments.iter().any(|(c, _)| c.as_str().eq_ignore_ascii_case(key.as_str())) {
            return Err(DatabaseError::InvalidInput(format!(
                "cannot assign the key column {key}"
            )));
        }
        let columns: Vec<Ident> = assignments.iter().map(|(c, _)| c.clone()).collect();
        let statement = sql::update_where_key_returning(table, &columns, key);
        debug!(%statement, "update row");

        let tx = self.write_tx().await?;
        let result = async {
            let recorder = begin(&tx, table).await?;
            // Old and new images pair on the binding's unique key, which must not move.
            let pairing = recorder.as_ref().map(|r| r.key_column().clone());
            if let Some(pairing) = &pairing
                && assignments.iter().any(|(c, _)| c.as_str().eq_ignore_ascii_case(pairing.as_str()))
            {
                return Err(DatabaseError::InvalidInput(format!(
                    "cannot assign the capture key column {pairing} of {table}"
                )));
            }
            let mut prior: HashMap<String, RowImage> = HashMap::new();
            if let Some(pairing) = &pairing {
                let rows = tx
                    .query(
                        sql::select_where_key(table, key).as_str(),
                        libsql::params_from_iter([json_to_value(key_value)]),
                    )
                    .await?;
                for image in collect_images(rows).await? {
                    if let Some(k) = image.pairing_key(pairing) {
                        prior.insert(k, image);
                    }
                }
            }

            let params = assignments
                .iter()
                .map(|(_, v)| json_to_value(v))
                .chain(std::iter::once(json_to_value(key_value)));
            let rows = tx.query(statement.as_str(), libsql::params_from_iter(params)).await?;
            let written = collect_images(rows).await?;
            let Some(pairing) = &pairing else {
                return Ok(written.len() as u64);
            };

            let mut changes = Vec::with_capacity(written.len());
            for new in written {
                let old = new
                    .pairing_key(pairing)
                    .and_then(|k| prior.remove(&k))
                    .ok_or_else(|| DatabaseError::Query(format!("no pre-image for updated row of {table}")))?;
                changes.push(ChangeContext::Update { old, new });
            }
            record_all(&tx, recorder.as_ref(), changes.into_iter()).await
        }
        .await;
        let updated = finish(tx, result).await?;
        info!(%table, rows = updated, "updated");
        Ok(updated)
    }

    /// Delete the rows whose `key` equals `key_value`. Returns the number of
    /// rows deleted.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the table is capture-owned, `AuditWriteFailure` if
    /// the table is monitored and the change cannot be recorded.
    pub async fn delete_row(
        &self,
        table: &QualifiedName,
        key: &Ident,
        key_value: &Json,
    ) -> Result<u64, DatabaseError> {
        let statement = sql::delete_where_key_returning(table, key);
        debug!(%statement, "delete row");

        let tx = self.write_tx().await?;
        let result = async {
            let recorder = begin(&tx, table).await?;
            let rows = tx.query(statement.as_str(), libsql::params_from_iter([json_to_value(key_value)])).await?;
            let removed = collect_images(rows).await?;
            record_all(&tx, recorder.as_ref(), removed.into_iter().map(|old| ChangeContext::Delete { old })).await
        }
        .await;
        let deleted = finish(tx, result).await?;
        info!(%table, rows = deleted, "deleted");
        Ok(deleted)
    }
}

/// Refuse capture-owned tables, then open the capture session if `table` is
/// monitored.
async fn begin(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<Option<ChangeRecorder>, DatabaseError> {
    if capture::is_capture_owned(conn, table).await? {
        return Err(capture::capture_owned(table));
    }
    let recorder = capture::recorder_for(conn, table).await?;
    if let Some(recorder) = &recorder {
        recorder.open_session(conn).await?;
    }
    Ok(recorder)
}

/// Record every change (if monitored), close the session, and count the changes.
async fn record_all(
    conn: &libsql::Connection,
    recorder: Option<&ChangeRecorder>,
    changes: impl Iterator<Item = ChangeContext> + Send,
) -> Result<u64, DatabaseError> {
    let mut count = 0_u64;
    for change in changes {
        if let Some(recorder) = recorder {
            recorder.record(conn, &change).await?;
        }
        count += 1;
    }
    if let Some(recorder) = recorder {
        recorder.close_session(conn).await?;
    }
    Ok(count)
}
