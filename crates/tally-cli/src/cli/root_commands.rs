use clap::{Args, Subcommand};

use crate::cli::EmbedderKind;
use crate::cli::subcommands::{EnrichCommands, EntityCommands, ExportCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Append an audit record to the caller's chain.
    Append(AppendArgs),
    /// Fetch one record by ID.
    Get { id: String },
    /// Range query over visible records.
    Query(QueryArgs),
    /// Recompute a chain and report the first divergence.
    Verify(VerifyArgs),
    /// Show the current tail of a chain.
    Tail {
        /// Chain to inspect (defaults to the caller's tenant)
        #[arg(long)]
        chain: Option<String>,
        /// Inspect the shared baseline chain
        #[arg(long, conflicts_with = "chain")]
        shared: bool,
    },
    /// Tracked entities watched by the per-row audit hook.
    Entity {
        #[command(subcommand)]
        action: EntityCommands,
    },
    /// Import entity rows from a JSONL file with one summary record.
    BulkImport(BulkImportArgs),
    /// Enrichment pipeline.
    Enrich {
        #[command(subcommand)]
        action: EnrichCommands,
    },
    /// Semantic search over enriched records.
    Search(SearchArgs),
    /// Export grants and artifacts.
    Export {
        #[command(subcommand)]
        action: ExportCommands,
    },
    /// Inspect the meta-audit access log.
    AccessLog(AccessLogArgs),
}

/// Arguments for `tally append`.
#[derive(Clone, Debug, Args)]
pub struct AppendArgs {
    #[arg(long)]
    pub event: String,
    #[arg(long)]
    pub entity_type: String,
    #[arg(long)]
    pub entity_id: String,
    /// info, warning, error, critical
    #[arg(long, default_value = "info")]
    pub severity: String,
    /// Action details as a JSON object
    #[arg(long, default_value = "{}")]
    pub details: String,
    /// Acting principal (defaults to the caller's user)
    #[arg(long)]
    pub actor: Option<String>,
    /// RFC 3339 timestamp (defaults to now)
    #[arg(long)]
    pub occurred_at: Option<String>,
    /// Retry on concurrent appends instead of failing
    #[arg(long)]
    pub retry: bool,
}

/// Record filter flags shared by `query` and `export create`.
#[derive(Clone, Debug, Default, Args)]
pub struct FilterArgs {
    /// Tenant scope (defaults to the caller's tenant)
    #[arg(long = "scope")]
    pub scope: Option<String>,
    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    pub from: Option<String>,
    /// Exclusive upper bound (RFC 3339)
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub event: Option<String>,
    #[arg(long)]
    pub severity: Option<String>,
    #[arg(long)]
    pub entity_type: Option<String>,
    #[arg(long)]
    pub entity_id: Option<String>,
    /// Include shared baseline records
    #[arg(long)]
    pub include_shared: bool,
}

/// Arguments for `tally query`.
#[derive(Clone, Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Arguments for `tally verify`.
#[derive(Clone, Debug, Args)]
pub struct VerifyArgs {
    /// Chain to verify (defaults to the caller's tenant)
    #[arg(long)]
    pub chain: Option<String>,
    /// Verify the shared baseline chain
    #[arg(long, conflicts_with = "chain")]
    pub shared: bool,
    /// First sequence number (inclusive)
    #[arg(long)]
    pub from_seq: Option<i64>,
    /// Last sequence number (inclusive)
    #[arg(long)]
    pub to_seq: Option<i64>,
}

/// Arguments for `tally bulk-import`.
#[derive(Clone, Debug, Args)]
pub struct BulkImportArgs {
    /// Entity collection to import into
    #[arg(long)]
    pub kind: String,
    /// JSONL file, one `{entity_id, payload}` object per line
    pub file: String,
}

/// Arguments for `tally search`.
#[derive(Clone, Debug, Args)]
pub struct SearchArgs {
    /// Free-text query (mutually exclusive with --like)
    #[arg(required_unless_present = "like")]
    pub query: Option<String>,
    /// Find records similar to this record ID
    #[arg(long, conflicts_with = "query")]
    pub like: Option<String>,
    #[arg(long)]
    pub scope: Option<String>,
    #[arg(long)]
    pub include_shared: bool,
    #[arg(long)]
    pub event: Option<String>,
    #[arg(long)]
    pub severity: Option<String>,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub anomalies_only: bool,
    #[arg(long)]
    pub min_similarity: Option<f32>,
    #[arg(long, value_enum, default_value = "hashing")]
    pub embedder: EmbedderKind,
}

/// Arguments for `tally access-log`.
#[derive(Clone, Debug, Args)]
pub struct AccessLogArgs {
    #[arg(long)]
    pub scope: Option<String>,
    #[arg(long)]
    pub actor: Option<String>,
    /// read, query, verify, search, export_create, ...
    #[arg(long)]
    pub action: Option<String>,
    /// Only security events
    #[arg(long)]
    pub security: bool,
    #[arg(long)]
    pub since: Option<String>,
}
