//! Catalog introspection through `SQLite`'s table-valued pragma functions.
//!
//! Table and schema names are bound as parameters; nothing is interpolated.

use tally_core::{ColumnShape, Ident, IndexShape, QualifiedName, TableShape};

use crate::LibsqlStore;
use crate::capture;
use crate::error::DatabaseError;
use crate::store::SchemaCatalog;

impl SchemaCatalog for LibsqlStore {
    async fn table_exists(&self, table: &QualifiedName) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM pragma_table_info(?1, ?2) LIMIT 1",
                libsql::params![table.table.as_str(), table.schema.as_str()],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn column_names(&self, table: &QualifiedName) -> Result<Vec<Ident>, DatabaseError> {
        Ok(read_columns(&self.connect().await?, table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn describe(&self, table: &QualifiedName) -> Result<Option<TableShape>, DatabaseError> {
        let conn = self.connect().await?;
        let columns = read_columns(&conn, table).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        let indexes = read_indexes(&conn, table).await?;
        Ok(Some(TableShape {
            name: table.clone(),
            columns,
            indexes,
        }))
    }

    async fn is_capture_owned(&self, table: &QualifiedName) -> Result<bool, DatabaseError> {
        capture::is_capture_owned(&self.connect().await?, table).await
    }
}

fn catalog_ident(name: String, table: &QualifiedName) -> Result<Ident, DatabaseError> {
    Ident::new(name).map_err(|e| {
        DatabaseError::InvalidInput(format!("{table} has a name tally cannot quote safely: {e}"))
    })
}

async fn read_columns(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<Vec<ColumnShape>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1, ?2) ORDER BY cid",
            libsql::params![table.table.as_str(), table.schema.as_str()],
        )
        .await?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next().await? {
        columns.push(ColumnShape {
            name: catalog_ident(row.get::<String>(0)?, table)?,
            decl_type: row.get::<Option<String>>(1)?.unwrap_or_default(),
            not_null: row.get::<i64>(2)? != 0,
            pk_ordinal: u32::try_from(row.get::<i64>(3)?)
                .map_err(|e| DatabaseError::Query(format!("pk ordinal out of range: {e}")))?,
        });
    }
    Ok(columns)
}

/// Non-partial, column-based indexes other than the primary key's own.
async fn read_indexes(
    conn: &libsql::Connection,
    table: &QualifiedName,
) -> Result<Vec<IndexShape>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT name, \"unique\" FROM pragma_index_list(?1, ?2) \
             WHERE origin <> 'pk' AND partial = 0 ORDER BY seq",
            libsql::params![table.table.as_str(), table.schema.as_str()],
        )
        .await?;
    let mut listed = Vec::new();
    while let Some(row) = rows.next().await? {
        listed.push((row.get::<String>(0)?, row.get::<i64>(1)? != 0));
    }

    let mut indexes = Vec::with_capacity(listed.len());
    'index: for (name, unique) in listed {
        let mut cols = conn
            .query(
                "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
                libsql::params![name.as_str(), table.schema.as_str()],
            )
            .await?;
        let mut columns = Vec::new();
        while let Some(row) = cols.next().await? {
            // NULL names are expression columns; such indexes are not recreated.
            let Some(column) = row.get::<Option<String>>(0)? else {
                continue 'index;
            };
            columns.push(catalog_ident(column, table)?);
        }
        indexes.push(IndexShape { unique, columns });
    }
    Ok(indexes)
}
