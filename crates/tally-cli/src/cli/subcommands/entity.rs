use clap::Subcommand;

/// Tracked entity commands.
#[derive(Clone, Debug, Subcommand)]
pub enum EntityCommands {
    /// Insert or replace an entity (audited unless the hook is suspended).
    Upsert {
        kind: String,
        id: String,
        /// Entity payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Get an entity.
    Get { kind: String, id: String },
}
