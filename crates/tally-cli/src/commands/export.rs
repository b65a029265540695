use std::io::Write;

use anyhow::Context;
use serde_json::json;
use tally_core::enums::{ExportFormat, SecurityLevel};
use tally_db::repos::ExportRequest;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::ExportCommands;
use crate::commands::shared::filter::record_filter;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;
use crate::progress::Progress;

/// Handle `tally export`.
pub async fn handle(action: &ExportCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        ExportCommands::Create {
            filter,
            format_as,
            level,
            ttl,
            allowed_users,
            download_limit,
        } => {
            let mut request = ExportRequest::new(
                record_filter(filter, None)?,
                parse_enum::<ExportFormat>(format_as, "format")?,
            );
            request.security_level = parse_enum::<SecurityLevel>(level, "security level")?;
            request.ttl_secs = *ttl;
            request.allowed_users = (!allowed_users.is_empty()).then(|| allowed_users.clone());
            request.download_limit = *download_limit;

            let progress = Progress::spinner("rendering export artifact");
            let grant = ctx.service.create_export(&ctx.caller, request).await;
            progress.finish(&grant, |g| format!("exported {} records", g.record_count), "export failed");
            output(&grant?, flags.format)
        }
        ExportCommands::Download { token, out } => {
            let download = ctx.service.download(&ctx.caller, token).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(path, &download.content)
                        .await
                        .with_context(|| format!("failed to write artifact to {path}"))?;
                    output(
                        &json!({
                            "path": path,
                            "bytes": download.content.len(),
                            "content_type": download.content_type,
                            "sha256": download.sha256,
                            "downloads_remaining": download
                                .grant
                                .download_limit
                                .map(|limit| limit.saturating_sub(download.grant.download_count)),
                        }),
                        flags.format,
                    )
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout
                        .write_all(&download.content)
                        .and_then(|()| stdout.flush())
                        .context("failed to write artifact to stdout")
                }
            }
        }
        ExportCommands::Show { token } => {
            let grant = ctx.service.get_grant(&ctx.caller, token).await?;
            output(&grant, flags.format)
        }
        ExportCommands::Revoke { token, reason } => {
            let grant = ctx.service.revoke(&ctx.caller, token, reason).await?;
            output(&grant, flags.format)
        }
        ExportCommands::Sweep => {
            let revoked = ctx.service.sweep_expired(&ctx.caller).await?;
            output(&json!({ "revoked": revoked }), flags.format)
        }
    }
}
