use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{EmbedderKind, GlobalFlags, IdentityFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `tally` binary.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about = "Tally - tamper-evident multi-tenant audit trail")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Max results to return
    #[arg(short, long, global = true)]
    pub limit: Option<u32>,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database path (overrides `database.path`)
    #[arg(long, global = true, env = "TALLY_DB")]
    pub database: Option<String>,

    /// Extra dotenv file to load before configuration
    #[arg(long, global = true)]
    pub env_file: Option<String>,

    /// Tenant the caller is authenticated for
    #[arg(long, global = true, env = "TALLY_TENANT")]
    pub tenant: Option<String>,

    /// Caller user or service principal
    #[arg(long, global = true, env = "TALLY_USER")]
    pub user: Option<String>,

    /// Caller role: viewer, member, auditor, admin
    #[arg(long, global = true, env = "TALLY_ROLE")]
    pub role: Option<String>,

    /// Act as the platform system identity
    #[arg(long, global = true, conflicts_with = "tenant")]
    pub system: bool,
}

impl Cli {
    /// Extract ergonomic global flags struct for command handlers.
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            limit: self.limit,
            quiet: self.quiet,
            database: self.database.clone(),
            env_file: self.env_file.clone(),
            identity: IdentityFlags {
                tenant: self.tenant.clone(),
                user: self.user.clone(),
                role: self.role.clone(),
                system: self.system,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    use super::subcommands::{ExportCommands, EnrichCommands};
    use super::{Cli, Commands, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from([
            "tally",
            "--format",
            "table",
            "--tenant",
            "acme",
            "--user",
            "u-1",
            "--limit",
            "10",
            "get",
            "aud-1",
        ])
        .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.limit, Some(10));
        let flags = cli.global_flags();
        assert_eq!(flags.identity.tenant.as_deref(), Some("acme"));
        assert!(matches!(cli.command, Commands::Get { ref id } if id == "aud-1"));
    }

    #[test]
    fn system_conflicts_with_tenant() {
        let result = Cli::try_parse_from(["tally", "--system", "--tenant", "acme", "tail"]);
        assert!(result.is_err());
    }

    #[test]
    fn nested_subcommands_parse() {
        let cli = Cli::try_parse_from(["tally", "export", "revoke", "xgt-abc", "--reason", "leak"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Export {
                action: ExportCommands::Revoke { ref reason, .. }
            } if reason == "leak"
        ));

        let cli = Cli::try_parse_from(["tally", "--system", "enrich", "run", "--all"])
            .expect("cli should parse");
        assert!(cli.system);
        assert!(matches!(
            cli.command,
            Commands::Enrich {
                action: EnrichCommands::Run { all: true, .. }
            }
        ));
    }
}
