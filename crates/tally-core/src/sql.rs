//! SQL statement builder.
//!
//! Generated DDL and DML is produced only here. Identifiers enter as
//! [`Ident`]/[`QualifiedName`] (already validated) and are always emitted
//! double-quoted; values are always bound as `?N` parameters. Catalog-sourced
//! declared types are checked against a conservative character set before
//! they are interpolated.

use std::fmt;

use crate::definition::{TableDefinition, TableShape};
use crate::errors::CoreError;
use crate::ident::{Ident, QualifiedName};

/// A generated SQL statement. Only this module can construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement(String);

impl Statement {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn column_list(columns: &[Ident]) -> String {
    columns
        .iter()
        .map(Ident::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn checked_decl_type(decl: &str) -> Result<&str, CoreError> {
    if decl
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | ' ' | '(' | ')' | ','))
    {
        Ok(decl.trim())
    } else {
        Err(CoreError::Validation(format!(
            "declared column type {decl:?} contains unsupported characters"
        )))
    }
}

/// `CREATE TABLE` for an inferred definition. Every column is generic.
#[must_use]
pub fn create_table(def: &TableDefinition) -> Statement {
    let columns = def
        .columns
        .iter()
        .map(|(name, ty)| format!("{} {}", name.quoted(), ty.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    Statement(format!("CREATE TABLE {} ({columns})", def.name.quoted()))
}

#[must_use]
pub fn drop_table_if_exists(table: &QualifiedName) -> Statement {
    Statement(format!("DROP TABLE IF EXISTS {}", table.quoted()))
}

/// Statements that create `name` with the same columns, declared types,
/// NOT NULL flags, primary key, and plain indexes as `shape`.
///
/// # Errors
///
/// Returns `CoreError::Validation` if a declared type contains characters
/// outside the accepted set.
pub fn create_table_like(shape: &TableShape, name: &QualifiedName) -> Result<Vec<Statement>, CoreError> {
    let mut defs = Vec::with_capacity(shape.columns.len() + 1);
    for column in &shape.columns {
        let decl = checked_decl_type(&column.decl_type)?;
        let mut def = column.name.quoted();
        if !decl.is_empty() {
            def.push(' ');
            def.push_str(decl);
        }
        if column.not_null {
            def.push_str(" NOT NULL");
        }
        defs.push(def);
    }
    let pk = shape.primary_key();
    if !pk.is_empty() {
        let pk: Vec<Ident> = pk.into_iter().cloned().collect();
        defs.push(format!("PRIMARY KEY ({})", column_list(&pk)));
    }

    let mut statements = vec![Statement(format!(
        "CREATE TABLE {} ({})",
        name.quoted(),
        defs.join(", ")
    ))];

    for (n, index) in shape.indexes.iter().enumerate() {
        let index_name = name.sibling(name.table.with_suffix(&format!("_idx{n}")));
        statements.push(Statement(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            index_name.quoted(),
            name.table.quoted(),
            column_list(&index.columns)
        )));
    }
    Ok(statements)
}

/// Unique index `<table>_<column>_key`, making `column` an upsert conflict target.
#[must_use]
pub fn create_unique_index(table: &QualifiedName, column: &Ident) -> Statement {
    let index_name = table.sibling(table.table.with_suffix(&format!("_{column}_key")));
    Statement(format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        index_name.quoted(),
        table.table.quoted(),
        column.quoted()
    ))
}

/// Parameterized single-row insert, `?1..?n` in column order.
#[must_use]
pub fn insert_values(table: &QualifiedName, columns: &[Ident]) -> Statement {
    Statement(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.quoted(),
        column_list(columns),
        placeholders(1, columns.len())
    ))
}

/// [`insert_values`] returning the full inserted row.
#[must_use]
pub fn insert_values_returning(table: &QualifiedName, columns: &[Ident]) -> Statement {
    Statement(format!("{} RETURNING *", insert_values(table, columns)))
}

/// Rows of `table` whose `key` equals `?1`.
#[must_use]
pub fn select_where_key(table: &QualifiedName, key: &Ident) -> Statement {
    Statement(format!(
        "SELECT * FROM {} WHERE {} = ?1",
        table.quoted(),
        key.quoted()
    ))
}

/// Rows of `target` whose key also appears in `staging`: the pre-images of
/// an upsert.
#[must_use]
pub fn select_conflicting(target: &QualifiedName, staging: &QualifiedName, key: &Ident) -> Statement {
    Statement(format!(
        "SELECT * FROM {target} WHERE {key} IN (SELECT {key} FROM {staging})",
        target = target.quoted(),
        staging = staging.quoted(),
        key = key.quoted()
    ))
}

/// The merge: every staging row inserted into `target`; on a key conflict
/// every non-key column takes the incoming value. Returns the written rows.
///
/// The `WHERE true` disambiguates `ON CONFLICT` from a join constraint in
/// SQLite's `INSERT ... SELECT` grammar.
#[must_use]
pub fn upsert_from(
    target: &QualifiedName,
    staging: &QualifiedName,
    columns: &[Ident],
    key: &Ident,
    non_key: &[Ident],
) -> Statement {
    let cols = column_list(columns);
    let assignments = if non_key.is_empty() {
        format!("{k} = excluded.{k}", k = key.quoted())
    } else {
        non_key
            .iter()
            .map(|c| format!("{c} = excluded.{c}", c = c.quoted()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Statement(format!(
        "INSERT INTO {target} ({cols}) SELECT {cols} FROM {staging} WHERE true \
         ON CONFLICT ({key}) DO UPDATE SET {assignments} RETURNING *",
        target = target.quoted(),
        staging = staging.quoted(),
        key = key.quoted(),
    ))
}

/// `UPDATE ... SET a = ?1, b = ?2 WHERE key = ?3 RETURNING *`.
#[must_use]
pub fn update_where_key_returning(table: &QualifiedName, assignments: &[Ident], key: &Ident) -> Statement {
    let sets = assignments
        .iter()
        .enumerate()
        .map(|(idx, col)| format!("{} = ?{}", col.quoted(), idx + 1))
        .collect::<Vec<_>>()
        .join(", ");
    Statement(format!(
        "UPDATE {} SET {sets} WHERE {} = ?{} RETURNING *",
        table.quoted(),
        key.quoted(),
        assignments.len() + 1
    ))
}

#[must_use]
pub fn delete_where_key_returning(table: &QualifiedName, key: &Ident) -> Statement {
    Statement(format!(
        "DELETE FROM {} WHERE {} = ?1 RETURNING *",
        table.quoted(),
        key.quoted()
    ))
}

/// Audit relation plus the triggers that make it append-only.
#[must_use]
pub fn create_audit_relation(audit: &QualifiedName) -> Vec<Statement> {
    let table = audit.quoted();
    let mut statements = vec![Statement(format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            log_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id  INTEGER NOT NULL,
            operation   TEXT NOT NULL CHECK (operation IN ('INSERT', 'UPDATE', 'DELETE')),
            old_image   TEXT CHECK (old_image IS NULL OR json_valid(old_image)),
            new_image   TEXT CHECK (new_image IS NULL OR json_valid(new_image)),
            captured_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            CHECK (
                (operation = 'INSERT' AND old_image IS NULL AND new_image IS NOT NULL)
             OR (operation = 'UPDATE' AND old_image IS NOT NULL AND new_image IS NOT NULL)
             OR (operation = 'DELETE' AND old_image IS NOT NULL AND new_image IS NULL)
            )
        )"
    ))];
    for event in ["UPDATE", "DELETE"] {
        let trigger = audit.sibling(audit.table.with_suffix(&format!("_no_{}", event.to_ascii_lowercase())));
        statements.push(Statement(format!(
            "CREATE TRIGGER IF NOT EXISTS {} BEFORE {event} ON {}
             BEGIN SELECT RAISE(ABORT, 'audit log is append-only'); END",
            trigger.quoted(),
            audit.table.quoted()
        )));
    }
    statements
}

/// Per-schema table whose rows mark the subjects the current write
/// transaction is recording changes for.
pub const CAPTURE_SESSION: &str = "_tally_capture_session";

const CAPTURE_EVENTS: [&str; 3] = ["INSERT", "UPDATE", "DELETE"];

/// The capture session table in the schema of `subject`.
#[must_use]
pub fn capture_session(subject: &QualifiedName) -> QualifiedName {
    subject.sibling(Ident::sanitized(CAPTURE_SESSION))
}

fn capture_trigger(subject: &QualifiedName, event: &str) -> QualifiedName {
    subject.sibling(
        subject
            .table
            .with_suffix(&format!("_capture_{}", event.to_ascii_lowercase())),
    )
}

/// Triggers binding `subject` to change capture. Every insert, update, and
/// delete on `subject`, and every insert into `audit`, aborts unless the
/// writing transaction has opened a capture session for `subject`.
#[must_use]
pub fn create_capture_guards(subject: &QualifiedName, audit: &QualifiedName) -> Vec<Statement> {
    let session = capture_session(subject);
    let unsessioned = format!(
        "NOT EXISTS (SELECT 1 FROM {} WHERE table_name = '{}')",
        session.table.quoted(),
        subject.table
    );
    let mut statements = vec![Statement(format!(
        "CREATE TABLE IF NOT EXISTS {} (table_name TEXT PRIMARY KEY COLLATE NOCASE)",
        session.quoted()
    ))];
    for event in CAPTURE_EVENTS {
        statements.push(Statement(format!(
            "CREATE TRIGGER IF NOT EXISTS {} BEFORE {event} ON {} WHEN {unsessioned}
             BEGIN SELECT RAISE(ABORT, '{subject} is monitored; changes must go through its change recorder'); END",
            capture_trigger(subject, event).quoted(),
            subject.table.quoted(),
        )));
    }
    let recorder_only = audit.sibling(audit.table.with_suffix("_recorder_only"));
    statements.push(Statement(format!(
        "CREATE TRIGGER IF NOT EXISTS {} BEFORE INSERT ON {} WHEN {unsessioned}
         BEGIN SELECT RAISE(ABORT, 'audit log {audit} is written only by the change recorder'); END",
        recorder_only.quoted(),
        audit.table.quoted(),
    )));
    statements
}

/// Drops the subject-side triggers of [`create_capture_guards`]. The guard
/// on the audit relation stays.
#[must_use]
pub fn drop_capture_guards(subject: &QualifiedName) -> Vec<Statement> {
    CAPTURE_EVENTS
        .iter()
        .map(|event| {
            Statement(format!(
                "DROP TRIGGER IF EXISTS {}",
                capture_trigger(subject, event).quoted()
            ))
        })
        .collect()
}

/// Opens the capture session of `?1` for the rest of the transaction.
#[must_use]
pub fn open_capture_session(subject: &QualifiedName) -> Statement {
    Statement(format!(
        "INSERT INTO {} (table_name) VALUES (?1)",
        capture_session(subject).quoted()
    ))
}

#[must_use]
pub fn close_capture_session(subject: &QualifiedName) -> Statement {
    Statement(format!(
        "DELETE FROM {} WHERE table_name = ?1",
        capture_session(subject).quoted()
    ))
}

/// Append one audit row; the store assigns `log_id` and `captured_at`.
#[must_use]
pub fn insert_audit(audit: &QualifiedName) -> Statement {
    Statement(format!(
        "INSERT INTO {} (subject_id, operation, old_image, new_image) \
         VALUES (?1, ?2, ?3, ?4) RETURNING log_id, captured_at",
        audit.quoted()
    ))
}

/// Audit rows newest first. Placeholders are numbered in the order
/// subject, operation (each only if requested), then limit.
#[must_use]
pub fn select_audit(audit: &QualifiedName, by_subject: bool, by_operation: bool) -> Statement {
    let mut conditions = Vec::new();
    let mut idx = 1;
    if by_subject {
        conditions.push(format!("subject_id = ?{idx}"));
        idx += 1;
    }
    if by_operation {
        conditions.push(format!("operation = ?{idx}"));
        idx += 1;
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Statement(format!(
        "SELECT log_id, subject_id, operation, old_image, new_image, captured_at \
         FROM {}{where_clause} ORDER BY log_id DESC LIMIT ?{idx}",
        audit.quoted()
    ))
}
