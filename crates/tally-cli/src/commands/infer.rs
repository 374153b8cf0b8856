use std::path::Path;

use tally_db::{InferReport, InferRequest};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::InferArgs;
use crate::commands::shared::parse;
use crate::context::AppContext;
use crate::output::output;

/// Handle `tally infer`.
pub async fn handle(args: &InferArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = run(args, ctx).await?;
    output(&report, flags)
}

pub async fn run(args: &InferArgs, ctx: &AppContext) -> anyhow::Result<InferReport> {
    let request = InferRequest {
        source: Path::new(&args.file),
        table: args.table.as_deref(),
        delimiter: parse::delimiter(args.delimiter, ctx.config.ingest.delimiter)?,
        drop_existing: args.drop || ctx.config.ingest.drop_existing,
    };
    Ok(ctx.inference().infer_and_load(&request).await?)
}
