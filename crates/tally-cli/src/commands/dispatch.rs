use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(command: Commands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match command {
        Commands::Append(args) => commands::record::append(&args, ctx, flags).await,
        Commands::Get { id } => commands::record::get(&id, ctx, flags).await,
        Commands::Query(args) => commands::record::query(&args, ctx, flags).await,
        Commands::Verify(args) => commands::record::verify(&args, ctx, flags).await,
        Commands::Tail { chain, shared } => {
            commands::record::tail(chain.as_deref(), shared, ctx, flags).await
        }
        Commands::Entity { action } => commands::entity::handle(&action, ctx, flags).await,
        Commands::BulkImport(args) => commands::entity::bulk_import(&args, ctx, flags).await,
        Commands::Enrich { action } => commands::enrich::handle(&action, ctx, flags).await,
        Commands::Search(args) => commands::search::handle(&args, ctx, flags).await,
        Commands::Export { action } => commands::export::handle(&action, ctx, flags).await,
        Commands::AccessLog(args) => commands::access_log::handle(&args, ctx, flags).await,
    }
}
