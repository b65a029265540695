use tally_core::enums::Severity;
use tally_search::{SearchFilters, search_text, similar_to_record};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::SearchArgs;
use crate::commands::shared::parse::{parse_enum, parse_optional_time};
use crate::context::AppContext;
use crate::output::output;

const DEFAULT_K: u32 = 10;

/// Handle `tally search`.
pub async fn handle(args: &SearchArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let filters = SearchFilters {
        tenant: args.scope.clone(),
        include_shared: args.include_shared,
        event_type: args.event.clone(),
        severity: args
            .severity
            .as_deref()
            .map(|raw| parse_enum::<Severity>(raw, "severity"))
            .transpose()?,
        from: parse_optional_time(args.from.as_deref(), "from")?,
        to: parse_optional_time(args.to.as_deref(), "to")?,
        anomalies_only: args.anomalies_only,
        k: usize::try_from(flags.limit.unwrap_or(DEFAULT_K))?,
        min_similarity: args.min_similarity.unwrap_or(-1.0),
    };

    let hits = match (&args.like, &args.query) {
        (Some(record_id), _) => similar_to_record(&ctx.service, &ctx.caller, record_id, &filters).await?,
        (None, Some(text)) => {
            let embedder = AppContext::embedder(args.embedder)?;
            search_text(&ctx.service, &ctx.caller, embedder, text, &filters).await?
        }
        (None, None) => anyhow::bail!("pass a query or --like <record-id>"),
    };
    output(&hits, flags.format)
}
