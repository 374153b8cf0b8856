use serde::Serialize;
use tally_db::CaptureBinding;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{MonitorArgs, UnmonitorArgs};
use crate::commands::shared::parse;
use crate::context::AppContext;
use crate::output::{Layout, Tabular, output};

#[derive(Debug, Serialize)]
pub struct UnmonitorReport {
    pub table: String,
    pub removed: bool,
}

impl Tabular for UnmonitorReport {
    fn layout(&self) -> Layout {
        Layout::Record(vec![("table", self.table.clone()), ("removed", self.removed.to_string())])
    }
}

/// Handle `tally monitor`.
pub async fn handle_monitor(args: &MonitorArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let binding = monitor(args, ctx).await?;
    output(&binding, flags)
}

/// Handle `tally unmonitor`.
pub async fn handle_unmonitor(
    args: &UnmonitorArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let table = ctx.table(&args.table, None)?;
    let removed = ctx.store.unmonitor(&table).await?;
    if !removed && !flags.quiet {
        eprintln!("{table} was not monitored");
    }
    output(
        &UnmonitorReport {
            table: table.to_string(),
            removed,
        },
        flags,
    )
}

pub async fn monitor(args: &MonitorArgs, ctx: &AppContext) -> anyhow::Result<CaptureBinding> {
    let table = ctx.table(&args.table, None)?;
    let key = parse::column(&args.key)?;
    Ok(ctx
        .store
        .monitor(&table, &key, &ctx.config.audit.table_suffix)
        .await?)
}
