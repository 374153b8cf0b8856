use std::path::Path;

use tally_db::UpsertReport;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::SyncArgs;
use crate::commands::shared::parse;
use crate::context::AppContext;
use crate::output::output;

/// Handle `tally sync`.
pub async fn handle(args: &SyncArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = run(args, ctx).await?;
    if !report.staging_dropped && !flags.quiet {
        eprintln!("warning: staging table {} could not be dropped", report.staging);
    }
    output(&report, flags)
}

pub async fn run(args: &SyncArgs, ctx: &AppContext) -> anyhow::Result<UpsertReport> {
    let target = ctx.table(&args.table, args.schema.as_deref())?;
    let key = parse::column(&args.key)?;
    let delimiter = u8::try_from(parse::delimiter(args.delimiter, ctx.config.ingest.delimiter)?)?;
    Ok(ctx
        .planner()?
        .upsert(&target, &key, Path::new(&args.file), delimiter)
        .await?)
}
