//! Table definitions (what inference creates) and table shapes (what the
//! catalog reports about a live table).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::ident::{Ident, QualifiedName};

/// Column type assigned by schema inference. Values are never sampled, so
/// there is exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
}

impl ColumnType {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
        }
    }
}

/// A table to be created: name plus ordered, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: QualifiedName,
    pub columns: Vec<(Ident, ColumnType)>,
}

impl TableDefinition {
    /// Build a definition with one generic column per header field, in order.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if there are no columns or two
    /// headers sanitize to the same name.
    pub fn from_headers(name: QualifiedName, headers: Vec<Ident>) -> Result<Self, CoreError> {
        if headers.is_empty() {
            return Err(CoreError::InvalidInput(format!("{name}: no columns")));
        }
        let mut seen = HashSet::with_capacity(headers.len());
        for header in &headers {
            if !seen.insert(header.as_str().to_ascii_lowercase()) {
                return Err(CoreError::InvalidInput(format!(
                    "{name}: duplicate column {header} after sanitization"
                )));
            }
        }
        Ok(Self {
            name,
            columns: headers
                .into_iter()
                .map(|header| (header, ColumnType::Text))
                .collect(),
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &Ident> {
        self.columns.iter().map(|(name, _)| name)
    }
}

/// A column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnShape {
    pub name: Ident,
    /// Declared type, as written in the original DDL (may be empty).
    pub decl_type: String,
    pub not_null: bool,
    /// 1-based position within the primary key, 0 if not part of it.
    pub pk_ordinal: u32,
}

/// A plain (non-partial, column-only) index as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexShape {
    pub unique: bool,
    pub columns: Vec<Ident>,
}

/// Structure of a live table: enough to create a structurally identical
/// staging relation and to decide whether a column is a conflict target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    pub name: QualifiedName,
    pub columns: Vec<ColumnShape>,
    pub indexes: Vec<IndexShape>,
}

impl TableShape {
    #[must_use]
    pub fn has_column(&self, column: &Ident) -> bool {
        self.columns.iter().any(|c| &c.name == column)
    }

    /// Primary-key columns in key order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&Ident> {
        let mut pk: Vec<&ColumnShape> = self.columns.iter().filter(|c| c.pk_ordinal > 0).collect();
        pk.sort_by_key(|c| c.pk_ordinal);
        pk.into_iter().map(|c| &c.name).collect()
    }

    /// Whether `column` alone carries a uniqueness constraint usable as an
    /// `ON CONFLICT` target.
    #[must_use]
    pub fn has_unique_key(&self, column: &Ident) -> bool {
        let pk = self.primary_key();
        if pk.len() == 1 && pk[0] == column {
            return true;
        }
        self.indexes
            .iter()
            .any(|idx| idx.unique && idx.columns.len() == 1 && &idx.columns[0] == column)
    }
}
