use clap::Subcommand;

use crate::cli::EmbedderKind;

/// Enrichment pipeline commands.
#[derive(Clone, Debug, Subcommand)]
pub enum EnrichCommands {
    /// Enrich pending records.
    Run {
        /// Tenant to enrich (defaults to the caller's tenant)
        #[arg(long)]
        scope: Option<String>,
        /// Shared baseline records only
        #[arg(long, conflicts_with_all = ["scope", "all"])]
        shared: bool,
        /// Every tenant (system identity only)
        #[arg(long, conflicts_with = "scope")]
        all: bool,
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
        /// Seconds between polls with --watch
        #[arg(long, default_value_t = 5)]
        interval: u64,
        #[arg(long, value_enum, default_value = "hashing")]
        embedder: EmbedderKind,
    },
    /// Show enrichment coverage.
    Coverage {
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, conflicts_with_all = ["scope", "all"])]
        shared: bool,
        #[arg(long, conflicts_with = "scope")]
        all: bool,
    },
    /// Clear a record's enrichment so the pipeline recomputes it.
    Regenerate {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mark a flagged record as a reviewed false positive.
    Review {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },
}
