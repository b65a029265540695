use anyhow::{Context, bail};
use serde_json::json;
use tally_core::entities::RecordCandidate;
use tally_core::enums::Severity;
use tally_core::identity::CallerContext;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{AppendArgs, QueryArgs, VerifyArgs};
use crate::commands::shared::filter::record_filter;
use crate::commands::shared::parse::{parse_enum, parse_object, parse_optional_time};
use crate::context::AppContext;
use crate::output::output;

/// Handle `tally append`.
pub async fn append(args: &AppendArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let severity: Severity = parse_enum(&args.severity, "severity")?;
    let details = parse_object(&args.details, "details")?;

    let mut candidate = RecordCandidate::for_caller(
        &ctx.caller,
        &args.event,
        &args.entity_type,
        &args.entity_id,
        severity,
        details,
    );
    if let Some(actor) = &args.actor {
        candidate.actor_id = Some(actor.clone());
    }
    candidate.occurred_at = parse_optional_time(args.occurred_at.as_deref(), "occurred-at")?;

    let appended = if args.retry {
        ctx.service.append_with_retry(&ctx.caller, candidate).await
    } else {
        ctx.service.append(&ctx.caller, candidate).await
    };
    let record = appended.context("append failed")?;

    output(&record, flags.format)
}

/// Handle `tally get`.
pub async fn get(id: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let record = ctx.service.get_record(&ctx.caller, id).await?;
    output(&record, flags.format)
}

/// Handle `tally query`.
pub async fn query(args: &QueryArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let limit = flags.limit.or(Some(ctx.config.general.default_limit));
    let filter = record_filter(&args.filter, limit)?;
    let records = ctx.service.query_records(&ctx.caller, &filter).await?;
    output(&records, flags.format)
}

/// Handle `tally verify`.
pub async fn verify(args: &VerifyArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let chain = chain_scope(&ctx.caller, args.chain.as_deref(), args.shared)?;
    let result = ctx
        .service
        .verify_chain(&ctx.caller, chain, args.from_seq, args.to_seq)
        .await?;
    output(&result, flags.format)?;
    if let Some(divergence) = &result.divergence {
        bail!(
            "chain diverges at seq {} ({:?}, record {})",
            divergence.seq,
            divergence.kind,
            divergence.record_id
        );
    }
    Ok(())
}

/// Handle `tally tail`.
pub async fn tail(
    chain: Option<&str>,
    shared: bool,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let scope = chain_scope(&ctx.caller, chain, shared)?;
    let tail = ctx.service.chain_tail(&ctx.caller, scope).await?;
    output(
        &json!({
            "chain": scope.unwrap_or("<shared>"),
            "seq": tail.seq,
            "chain_hash": tail.chain_hash,
        }),
        flags.format,
    )
}

/// Resolve which chain a command targets. `None` is the shared baseline.
fn chain_scope<'a>(
    caller: &'a CallerContext,
    chain: Option<&'a str>,
    shared: bool,
) -> anyhow::Result<Option<&'a str>> {
    if shared {
        return Ok(None);
    }
    match chain.or_else(|| caller.tenant_id()) {
        Some(tenant) => Ok(Some(tenant)),
        None => bail!("the system identity must name a chain with --chain or pass --shared"),
    }
}
