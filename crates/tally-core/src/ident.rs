//! Validated SQL identifiers and the name sanitizer.
//!
//! Every table and column name that reaches generated SQL passes through
//! [`Ident`]. Names discovered at runtime (file headers, file names, catalog
//! rows) are either sanitized into an `Ident` or rejected.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Replace every character outside `[A-Za-z0-9_]` with `_` and prefix a
/// leading digit with `_`. An empty name becomes `_`.
///
/// Idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() || out.starts_with(|ch: char| ch.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn is_valid(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// An identifier matching `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    /// Validate an identifier without altering it.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidIdentifier` if `name` contains characters
    /// outside the identifier set or starts with a digit.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(CoreError::InvalidIdentifier(name))
        }
    }

    /// Sanitize an arbitrary name into an identifier. Never fails.
    #[must_use]
    pub fn sanitized(raw: &str) -> Self {
        Self(sanitize(raw))
    }

    /// Derive a table name from a file path: base name, extension stripped,
    /// sanitized.
    #[must_use]
    pub fn from_file_stem(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::sanitized(&stem)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as a double-quoted SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        // Validation excludes `"`, so no escaping is needed.
        format!("\"{}\"", self.0)
    }

    /// Append a suffix, re-sanitizing the result.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self::sanitized(&format!("{}{suffix}", self.0))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ident {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ident> for String {
    fn from(value: Ident) -> Self {
        value.0
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Ident,
    pub table: Ident,
}

impl QualifiedName {
    #[must_use]
    pub const fn new(schema: Ident, table: Ident) -> Self {
        Self { schema, table }
    }

    /// Validate both parts.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidIdentifier` if either part is invalid.
    pub fn parse(schema: &str, table: &str) -> Result<Self, CoreError> {
        Ok(Self::new(Ident::new(schema)?, Ident::new(table)?))
    }

    /// `"schema"."table"`.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("{}.{}", self.schema.quoted(), self.table.quoted())
    }

    /// A sibling relation in the same schema.
    #[must_use]
    pub fn sibling(&self, table: Ident) -> Self {
        Self::new(self.schema.clone(), table)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
