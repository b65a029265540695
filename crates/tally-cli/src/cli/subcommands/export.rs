use clap::Subcommand;

use crate::cli::root_commands::FilterArgs;

/// Export grant commands.
#[derive(Clone, Debug, Subcommand)]
pub enum ExportCommands {
    /// Render an artifact and issue a grant for it.
    Create {
        #[command(flatten)]
        filter: FilterArgs,
        /// json, jsonl, csv
        #[arg(long, default_value = "json")]
        format_as: String,
        /// standard, confidential, restricted
        #[arg(long, default_value = "standard")]
        level: String,
        /// Grant lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Users allowed to download (repeatable)
        #[arg(long = "allow")]
        allowed_users: Vec<String>,
        #[arg(long)]
        download_limit: Option<u32>,
    },
    /// Download an artifact (counts against the grant).
    Download {
        token: String,
        /// Write the artifact here instead of stdout
        #[arg(long, short = 'o')]
        out: Option<String>,
    },
    /// Show a grant without downloading.
    Show { token: String },
    /// Revoke a grant.
    Revoke {
        token: String,
        #[arg(long)]
        reason: String,
    },
    /// Revoke every expired grant in scope.
    Sweep,
}
