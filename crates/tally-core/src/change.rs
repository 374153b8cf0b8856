//! Change-capture types: row images, the explicit change context handed to
//! the recorder, and the audit record it produces.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CoreError;
use crate::ident::Ident;

/// Snapshot of a row's column values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowImage(Map<String, Value>);

impl RowImage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extract the integer subject id from `key`.
    ///
    /// Accepts integer values and text that parses as an integer, since
    /// inferred tables store every value as text.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the column is missing, NULL, or not
    /// an integer.
    pub fn subject_id(&self, key: &Ident) -> Result<i64, CoreError> {
        match self.get(key.as_str()) {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                CoreError::Validation(format!("key {key} value {n} is not an integer"))
            }),
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
                CoreError::Validation(format!("key {key} value {s:?} is not an integer"))
            }),
            Some(other) => Err(CoreError::Validation(format!(
                "key {key} value {other} is not an integer"
            ))),
            None => Err(CoreError::Validation(format!("row image has no key column {key}"))),
        }
    }

    /// Key used to pair pre-images with post-images of the same row.
    #[must_use]
    pub fn pairing_key(&self, key: &Ident) -> Option<String> {
        self.get(key.as_str()).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl FromIterator<(String, Value)> for RowImage {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The kind of row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(CoreError::Validation(format!("unknown operation kind {s:?}"))),
        }
    }
}

/// One row mutation, as delivered to the change recorder.
///
/// Each variant carries exactly the images its kind allows.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeContext {
    Insert { new: RowImage },
    Update { old: RowImage, new: RowImage },
    Delete { old: RowImage },
}

impl ChangeContext {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Insert { .. } => OperationKind::Insert,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    #[must_use]
    pub const fn old(&self) -> Option<&RowImage> {
        match self {
            Self::Insert { .. } => None,
            Self::Update { old, .. } | Self::Delete { old } => Some(old),
        }
    }

    #[must_use]
    pub const fn new_image(&self) -> Option<&RowImage> {
        match self {
            Self::Insert { new } | Self::Update { new, .. } => Some(new),
            Self::Delete { .. } => None,
        }
    }

    /// The image whose key identifies the subject: the new row for inserts,
    /// the old row otherwise.
    #[must_use]
    pub const fn subject_image(&self) -> &RowImage {
        match self {
            Self::Insert { new } => new,
            Self::Update { old, .. } | Self::Delete { old } => old,
        }
    }
}

/// An audit row ready to be persisted (no id or timestamp yet).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAudit {
    pub subject_id: i64,
    pub operation: OperationKind,
    pub old_image: Option<String>,
    pub new_image: Option<String>,
}

impl PendingAudit {
    /// Build the audit row for a change.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the subject key is not an integer,
    /// or `CoreError::Other` if an image cannot be serialized.
    pub fn from_change(ctx: &ChangeContext, key: &Ident) -> Result<Self, CoreError> {
        let encode = |image: Option<&RowImage>| {
            image
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| CoreError::Other(e.into()))
        };
        Ok(Self {
            subject_id: ctx.subject_image().subject_id(key)?,
            operation: ctx.kind(),
            old_image: encode(ctx.old())?,
            new_image: encode(ctx.new_image())?,
        })
    }
}

/// An immutable, persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub log_id: i64,
    pub subject_id: i64,
    pub operation: OperationKind,
    pub old_image: Option<RowImage>,
    pub new_image: Option<RowImage>,
    pub captured_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Whether the images present match the operation kind.
    #[must_use]
    pub const fn images_consistent(&self) -> bool {
        match self.operation {
            OperationKind::Insert => self.old_image.is_none() && self.new_image.is_some(),
            OperationKind::Update => self.old_image.is_some() && self.new_image.is_some(),
            OperationKind::Delete => self.old_image.is_some() && self.new_image.is_none(),
        }
    }
}
