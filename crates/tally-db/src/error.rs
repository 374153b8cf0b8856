//! Database error types for tally-db.

use tally_core::CoreError;
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Unreadable file, bad header, unknown table or column, or a request
    /// the store refuses.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A table of the target name already exists and dropping was not requested.
    #[error("Table {table} already exists")]
    NameCollision { table: String },

    /// The key column has no primary key or unique index to merge on.
    #[error("Column {column} of {table} carries no uniqueness constraint to merge on")]
    ConflictTargetMissing { table: String, column: String },

    /// A row could not be bulk-loaded; nothing from the load remains.
    #[error("Load into {relation} failed{}: {reason}", at_line(.line.as_ref()))]
    LoadFailure {
        relation: String,
        line: Option<u64>,
        reason: String,
    },

    /// The audit row for a change could not be written; the change was rolled back.
    #[error("Audit write for {table} failed: {source}")]
    AuditWriteFailure {
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation failed and dropping the relation it created failed too.
    #[error("{primary} (cleanup also failed: {cleanup})")]
    WithCleanupFailure {
        primary: Box<DatabaseError>,
        cleanup: Box<DatabaseError>,
    },

    /// A SQL query failed or returned data of an unexpected shape.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn at_line(line: Option<&u64>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

/// Caller-facing classification of a [`DatabaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NameCollision,
    ConflictTargetMissing,
    LoadFailure,
    AuditWriteFailure,
    Store,
}

impl DatabaseError {
    /// The error that caused the operation to fail, without cleanup decoration.
    #[must_use]
    pub fn primary(&self) -> &Self {
        match self {
            Self::WithCleanupFailure { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// Classification of [`Self::primary`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.primary() {
            Self::InvalidInput(_)
            | Self::Core(
                CoreError::InvalidInput(_)
                | CoreError::Unreadable { .. }
                | CoreError::InvalidIdentifier(_),
            ) => ErrorKind::InvalidInput,
            Self::NameCollision { .. } => ErrorKind::NameCollision,
            Self::ConflictTargetMissing { .. } => ErrorKind::ConflictTargetMissing,
            Self::LoadFailure { .. } => ErrorKind::LoadFailure,
            Self::AuditWriteFailure { .. } => ErrorKind::AuditWriteFailure,
            _ => ErrorKind::Store,
        }
    }

    /// Attach a failed cleanup to this error.
    #[must_use]
    pub fn with_cleanup(self, cleanup: Self) -> Self {
        Self::WithCleanupFailure {
            primary: Box::new(self),
            cleanup: Box::new(cleanup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_unwraps_cleanup_decoration() {
        let err = DatabaseError::LoadFailure {
            relation: "main.people".into(),
            line: Some(3),
            reason: "found record with 2 fields, but the previous record has 3 fields".into(),
        }
        .with_cleanup(DatabaseError::Query("database is locked".into()));

        assert_eq!(err.kind(), ErrorKind::LoadFailure);
        assert!(matches!(err.primary(), DatabaseError::LoadFailure { line: Some(3), .. }));
        let msg = err.to_string();
        assert!(msg.contains("at line 3"), "{msg}");
        assert!(msg.contains("cleanup also failed"), "{msg}");
    }

    #[test]
    fn core_input_errors_classify_as_invalid_input() {
        let err: DatabaseError = CoreError::InvalidIdentifier("a b".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err: DatabaseError = CoreError::Validation("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn load_failure_without_line() {
        let err = DatabaseError::LoadFailure {
            relation: "main.t".into(),
            line: None,
            reason: "stream closed".into(),
        };
        assert_eq!(err.to_string(), "Load into main.t failed: stream closed");
    }
}
