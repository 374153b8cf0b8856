//! Cross-cutting error types for tally.
//!
//! Store-level failures (`DatabaseError`) live in `tally-db`; configuration
//! failures (`ConfigError`) in `tally-config`. Everything that converges at
//! the binary is wrapped in `anyhow` by `tally-cli`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the pure core: identifiers, headers, and change images.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input file or header line is unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The file could not be opened or read.
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A name does not match `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A row image or catalog value failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
