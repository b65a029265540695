use clap::ValueEnum;

/// Shared output mode across all commands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Raw,
}

/// Which embedder the enrichment and search commands use.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedderKind {
    /// Deterministic feature hashing. No model download.
    Hashing,
    /// Local ONNX model via fastembed.
    Fastembed,
}

/// Global flags available before or after subcommands.
#[derive(Clone, Debug)]
pub struct GlobalFlags {
    pub format: OutputFormat,
    pub limit: Option<u32>,
    pub quiet: bool,
    pub database: Option<String>,
    pub env_file: Option<String>,
    pub identity: IdentityFlags,
}

/// Caller identity as asserted by the external identity provider.
#[derive(Clone, Debug, Default)]
pub struct IdentityFlags {
    pub tenant: Option<String>,
    pub user: Option<String>,
    pub role: Option<String>,
    pub system: bool,
}
