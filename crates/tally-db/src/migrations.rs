//! Database migration runner.
//!
//! Embeds the SQL migration files at compile time and executes them on
//! store open. All statements use `IF NOT EXISTS` for idempotent re-running.

use crate::error::DatabaseError;

/// Capture binding table.
const MIGRATION_001: &str = include_str!("../migrations/001_capture.sql");
/// Audit relation registry.
const MIGRATION_002: &str = include_str!("../migrations/002_audit_relations.sql");

/// Run all embedded migrations in sequence.
pub(crate) async fn run_migrations(conn: &libsql::Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(MIGRATION_001)
        .await
        .map_err(|e| DatabaseError::Migration(format!("001_capture: {e}")))?;
    conn.execute_batch(MIGRATION_002)
        .await
        .map_err(|e| DatabaseError::Migration(format!("002_audit_relations: {e}")))?;
    Ok(())
}
