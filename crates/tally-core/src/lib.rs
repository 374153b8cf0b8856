//! # tally-core
//!
//! Core types shared across all tally crates.
//!
//! This crate performs no database I/O. It provides:
//! - Validated identifiers and the name sanitizer
//! - Header-line parsing for delimited files
//! - Table definitions and catalog shapes
//! - The SQL statement builder (the only place identifiers become SQL text)
//! - Row images, change contexts, and audit records
//! - Cross-cutting error types

pub mod change;
pub mod definition;
pub mod errors;
pub mod header;
pub mod ident;
pub mod sql;

pub use change::{AuditRecord, ChangeContext, OperationKind, PendingAudit, RowImage};
pub use definition::{ColumnShape, ColumnType, IndexShape, TableDefinition, TableShape};
pub use errors::CoreError;
pub use ident::{Ident, QualifiedName, sanitize};
pub use sql::Statement;
