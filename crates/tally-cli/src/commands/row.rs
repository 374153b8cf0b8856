use serde::Serialize;
use tally_core::OperationKind;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::RowCommands;
use crate::commands::shared::parse;
use crate::context::AppContext;
use crate::output::{Layout, Tabular, output};

#[derive(Debug, Serialize)]
pub struct RowReport {
    pub table: String,
    pub operation: OperationKind,
    pub rows: u64,
}

impl Tabular for RowReport {
    fn layout(&self) -> Layout {
        Layout::Record(vec![
            ("table", self.table.clone()),
            ("operation", self.operation.to_string()),
            ("rows", self.rows.to_string()),
        ])
    }
}

/// Handle `tally row`.
pub async fn handle(action: &RowCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = run(action, ctx).await?;
    if report.rows == 0 && !flags.quiet {
        eprintln!("no row matched in {}", report.table);
    }
    output(&report, flags)
}

pub async fn run(action: &RowCommands, ctx: &AppContext) -> anyhow::Result<RowReport> {
    let (table, operation, rows) = match action {
        RowCommands::Insert(args) => {
            let table = ctx.table(&args.table, None)?;
            let values = parse::assignments(&args.set)?;
            let rows = ctx.store.insert_row(&table, &values).await?;
            (table, OperationKind::Insert, rows)
        }
        RowCommands::Update(args) => {
            let table = ctx.table(&args.table, None)?;
            let key = parse::column(&args.target.key)?;
            let assignments = parse::assignments(&args.set)?;
            let rows = ctx
                .store
                .update_row(&table, &key, &parse::value(&args.target.value), &assignments)
                .await?;
            (table, OperationKind::Update, rows)
        }
        RowCommands::Delete(args) => {
            let table = ctx.table(&args.table, None)?;
            let key = parse::column(&args.target.key)?;
            let rows = ctx
                .store
                .delete_row(&table, &key, &parse::value(&args.target.value))
                .await?;
            (table, OperationKind::Delete, rows)
        }
    };
    Ok(RowReport {
        table: table.to_string(),
        operation,
        rows,
    })
}
