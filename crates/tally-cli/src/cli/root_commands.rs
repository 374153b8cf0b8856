use clap::{Args, Subcommand};

use crate::cli::subcommands::RowCommands;

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Preview the sanitized column names of a file's header line.
    Headers(HeadersArgs),
    /// Create a table from a file's header line and load its rows.
    Infer(InferArgs),
    /// Add a unique key so a table can be an upsert target.
    Constrain(ConstrainArgs),
    /// Start recording row changes of a table into its audit table.
    Monitor(MonitorArgs),
    /// Stop recording row changes (the audit table is kept).
    Unmonitor(UnmonitorArgs),
    /// Upsert a file into an existing table through a staging table.
    Sync(SyncArgs),
    /// Single-row changes, recorded when the table is monitored.
    Row {
        #[command(subcommand)]
        action: RowCommands,
    },
    /// View the audit log of a monitored table.
    Audit(AuditArgs),
}

/// Arguments for `tally headers`.
#[derive(Clone, Debug, Args)]
pub struct HeadersArgs {
    pub file: String,
    /// Field delimiter (defaults to `ingest.delimiter`).
    #[arg(long)]
    pub delimiter: Option<char>,
}

/// Arguments for `tally infer`.
#[derive(Clone, Debug, Args)]
pub struct InferArgs {
    pub file: String,
    /// Table name (sanitized); defaults to the file name without extension.
    #[arg(long)]
    pub table: Option<String>,
    #[arg(long)]
    pub delimiter: Option<char>,
    /// Drop the table first if it already exists.
    #[arg(long)]
    pub drop: bool,
}

/// Arguments for `tally constrain`.
#[derive(Clone, Debug, Args)]
pub struct ConstrainArgs {
    pub table: String,
    pub column: String,
}

/// Arguments for `tally monitor`.
#[derive(Clone, Debug, Args)]
pub struct MonitorArgs {
    pub table: String,
    /// Unique integer column identifying each row in the audit log.
    #[arg(long)]
    pub key: String,
}

/// Arguments for `tally unmonitor`.
#[derive(Clone, Debug, Args)]
pub struct UnmonitorArgs {
    pub table: String,
}

/// Arguments for `tally sync`.
#[derive(Clone, Debug, Args)]
pub struct SyncArgs {
    pub file: String,
    #[arg(long)]
    pub table: String,
    /// Conflict target column.
    #[arg(long)]
    pub key: String,
    /// Schema of the target table (defaults to `database.schema`).
    #[arg(long)]
    pub schema: Option<String>,
    #[arg(long)]
    pub delimiter: Option<char>,
}

/// Arguments for `tally audit`.
#[derive(Clone, Debug, Args)]
pub struct AuditArgs {
    pub table: String,
    /// Only records for this key value.
    #[arg(long)]
    pub subject: Option<i64>,
    /// Only records of this kind: insert, update, delete.
    #[arg(long)]
    pub operation: Option<String>,
}
