use std::time::Duration;

use anyhow::{Context, bail};
use tally_core::identity::CallerContext;
use tally_enrich::{EnrichmentPipeline, EnrichmentScope, PipelineSettings};
use tokio_util::sync::CancellationToken;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::EnrichCommands;
use crate::context::AppContext;
use crate::output::output;
use crate::progress::Progress;

/// Handle `tally enrich`.
pub async fn handle(action: &EnrichCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        EnrichCommands::Run {
            scope,
            shared,
            all,
            watch,
            interval,
            embedder,
        } => {
            let scope = enrichment_scope(&ctx.caller, scope.as_deref(), *shared, *all)?;
            let pipeline = EnrichmentPipeline::new(ctx.service.clone(), AppContext::embedder(*embedder)?)
                .with_settings(PipelineSettings::from(&ctx.config.enrichment));

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, draining enrichment workers");
                    on_interrupt.cancel();
                }
            });

            let progress = Progress::spinner("enriching pending records");
            let report = if *watch {
                pipeline
                    .run_until_cancelled(&scope, Duration::from_secs(*interval), &cancel)
                    .await
            } else {
                pipeline.run_once(&scope, &cancel).await
            };
            progress.finish(&report, |r| format!("scored {} records", r.scored), "enrichment stopped");
            let report = report.context("enrichment run failed")?;
            output(&report, flags.format)
        }
        EnrichCommands::Coverage { scope, shared, all } => {
            let scope = enrichment_scope(&ctx.caller, scope.as_deref(), *shared, *all)?;
            let coverage = ctx.service.coverage(&ctx.caller, &scope).await?;
            output(
                &serde_json::json!({
                    "coverage": coverage,
                    "ratio": coverage.ratio(),
                }),
                flags.format,
            )
        }
        EnrichCommands::Regenerate { id, reason } => {
            let record = ctx
                .service
                .request_regenerate(&ctx.caller, id, reason.as_deref())
                .await?;
            output(&record, flags.format)
        }
        EnrichCommands::Review { id, note } => {
            let record = ctx
                .service
                .review_false_positive(&ctx.caller, id, note.as_deref())
                .await?;
            output(&record, flags.format)
        }
    }
}

fn enrichment_scope(
    caller: &CallerContext,
    tenant: Option<&str>,
    shared: bool,
    all: bool,
) -> anyhow::Result<EnrichmentScope> {
    if all {
        return Ok(EnrichmentScope::All);
    }
    if shared {
        return Ok(EnrichmentScope::Shared);
    }
    match tenant.or_else(|| caller.tenant_id()) {
        Some(tenant) => Ok(EnrichmentScope::Tenant(tenant.to_string())),
        None => bail!("the system identity must pass --scope, --shared or --all"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tally_core::enums::Role;

    use super::*;

    #[test]
    fn scope_defaults_to_caller_tenant() {
        let caller = CallerContext::tenant("acme", "u-1", Role::Member);
        assert_eq!(
            enrichment_scope(&caller, None, false, false).unwrap(),
            EnrichmentScope::Tenant("acme".into())
        );
        assert_eq!(
            enrichment_scope(&caller, None, true, false).unwrap(),
            EnrichmentScope::Shared
        );
    }

    #[test]
    fn system_needs_explicit_scope() {
        let sys = CallerContext::system();
        assert!(enrichment_scope(&sys, None, false, false).is_err());
        assert_eq!(enrichment_scope(&sys, None, false, true).unwrap(), EnrichmentScope::All);
    }
}
