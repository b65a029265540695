use tally_core::enums::AccessAction;
use tally_db::repos::AccessLogFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::AccessLogArgs;
use crate::commands::shared::parse::{parse_enum, parse_optional_time};
use crate::context::AppContext;
use crate::output::output;

/// Handle `tally access-log`.
pub async fn handle(args: &AccessLogArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let filter = AccessLogFilter {
        tenant: args.scope.clone(),
        actor_id: args.actor.clone(),
        action: args
            .action
            .as_deref()
            .map(|raw| parse_enum::<AccessAction>(raw, "action"))
            .transpose()?,
        security_only: args.security,
        since: parse_optional_time(args.since.as_deref(), "since")?,
        limit: flags.limit.or(Some(ctx.config.general.default_limit)),
    };
    let entries = ctx.service.query_access_log(&ctx.caller, &filter).await?;
    output(&entries, flags.format)
}
