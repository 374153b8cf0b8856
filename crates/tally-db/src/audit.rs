//! Audit log queries.

use tally_core::{AuditRecord, OperationKind, QualifiedName, sql};

use crate::LibsqlStore;
use crate::capture::find_binding;
use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_optional_image};

/// Filter criteria for audit queries.
#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub subject_id: Option<i64>,
    pub operation: Option<OperationKind>,
    /// Defaults to the store's [`audit_limit`](LibsqlStore::audit_limit).
    pub limit: Option<u32>,
}

impl LibsqlStore {
    /// Audit records of a monitored table, newest first.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the table is not monitored.
    pub async fn query_audit(
        &self,
        table: &QualifiedName,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let binding = find_binding(&conn, table)
            .await?
            .ok_or_else(|| DatabaseError::InvalidInput(format!("{table} is not monitored")))?;

        let mut params: Vec<libsql::Value> = Vec::new();
        if let Some(subject) = filter.subject_id {
            params.push(libsql::Value::Integer(subject));
        }
        if let Some(operation) = filter.operation {
            params.push(libsql::Value::Text(operation.as_str().to_string()));
        }
        params.push(libsql::Value::Integer(i64::from(
            filter.limit.unwrap_or(self.audit_limit()),
        )));

        let statement = sql::select_audit(
            &binding.audit_table,
            filter.subject_id.is_some(),
            filter.operation.is_some(),
        );
        let mut rows = conn
            .query(statement.as_str(), libsql::params_from_iter(params))
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(AuditRecord {
                log_id: row.get::<i64>(0)?,
                subject_id: row.get::<i64>(1)?,
                operation: row
                    .get::<String>(2)?
                    .parse()
                    .map_err(|e| DatabaseError::Query(format!("bad audit operation: {e}")))?,
                old_image: parse_optional_image(get_opt_string(&row, 3)?.as_deref())?,
                new_image: parse_optional_image(get_opt_string(&row, 4)?.as_deref())?,
                captured_at: parse_datetime(&row.get::<String>(5)?)?,
            });
        }
        Ok(records)
    }
}
