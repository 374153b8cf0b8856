use clap::{Args, Subcommand};

/// Single-row commands.
#[derive(Clone, Debug, Subcommand)]
pub enum RowCommands {
    /// Insert one row.
    Insert(RowInsertArgs),
    /// Update the row with the given key value.
    Update(RowUpdateArgs),
    /// Delete the row with the given key value.
    Delete(RowDeleteArgs),
}

/// The row a command addresses.
#[derive(Clone, Debug, Args)]
pub struct KeyTarget {
    /// Key column.
    #[arg(long)]
    pub key: String,
    /// Key value.
    #[arg(long)]
    pub value: String,
}

#[derive(Clone, Debug, Args)]
pub struct RowInsertArgs {
    pub table: String,
    /// Column value as `col=value`; repeatable.
    #[arg(long, required = true)]
    pub set: Vec<String>,
}

#[derive(Clone, Debug, Args)]
pub struct RowUpdateArgs {
    pub table: String,
    #[command(flatten)]
    pub target: KeyTarget,
    /// Column value as `col=value`; repeatable.
    #[arg(long, required = true)]
    pub set: Vec<String>,
}

#[derive(Clone, Debug, Args)]
pub struct RowDeleteArgs {
    pub table: String,
    #[command(flatten)]
    pub target: KeyTarget,
}
