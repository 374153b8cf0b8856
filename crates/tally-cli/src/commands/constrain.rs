use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::ConstrainArgs;
use crate::commands::shared::parse;
use crate::context::AppContext;
use crate::output::{Layout, Tabular, output};

#[derive(Debug, Serialize)]
pub struct ConstrainReport {
    pub table: String,
    pub column: String,
    pub index: String,
}

impl Tabular for ConstrainReport {
    fn layout(&self) -> Layout {
        Layout::Record(vec![
            ("table", self.table.clone()),
            ("column", self.column.clone()),
            ("index", self.index.clone()),
        ])
    }
}

/// Handle `tally constrain`.
pub async fn handle(args: &ConstrainArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = run(args, ctx).await?;
    output(&report, flags)
}

pub async fn run(args: &ConstrainArgs, ctx: &AppContext) -> anyhow::Result<ConstrainReport> {
    let table = ctx.table(&args.table, None)?;
    let column = parse::column(&args.column)?;
    ctx.store.add_unique_key(&table, &column).await?;
    Ok(ConstrainReport {
        index: format!("{}_{}_key", table.table, column),
        table: table.to_string(),
        column: column.to_string(),
    })
}
