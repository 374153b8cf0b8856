use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Infer(args) => commands::infer::handle(&args, ctx, flags).await,
        Commands::Constrain(args) => commands::constrain::handle(&args, ctx, flags).await,
        Commands::Monitor(args) => commands::capture::handle_monitor(&args, ctx, flags).await,
        Commands::Unmonitor(args) => commands::capture::handle_unmonitor(&args, ctx, flags).await,
        Commands::Sync(args) => commands::sync::handle(&args, ctx, flags).await,
        Commands::Row { action } => commands::row::handle(&action, ctx, flags).await,
        Commands::Audit(args) => commands::audit::handle(&args, ctx, flags).await,
        Commands::Headers(_) => {
            anyhow::bail!("headers is handled before the database is opened")
        }
    }
}
