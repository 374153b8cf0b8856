use tally_core::{AuditRecord, OperationKind};
use tally_db::AuditFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::AuditArgs;
use crate::context::AppContext;
use crate::output::output;

/// Handle `tally audit`.
pub async fn handle(args: &AuditArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let records = fetch(args, ctx, flags).await?;
    output(&records, flags)
}

pub async fn fetch(args: &AuditArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<Vec<AuditRecord>> {
    let table = ctx.table(&args.table, None)?;
    let filter = AuditFilter {
        subject_id: args.subject,
        operation: args
            .operation
            .as_deref()
            .map(|value| {
                value
                    .parse::<OperationKind>()
                    .map_err(|error| anyhow::anyhow!("invalid operation '{value}': {error}"))
            })
            .transpose()?,
        limit: flags.limit,
    };

    ctx.store.query_audit(&table, &filter).await.map_err(Into::into)
}
