use anyhow::Context;
use serde_json::json;
use tally_core::entities::EntityRow;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::BulkImportArgs;
use crate::cli::subcommands::EntityCommands;
use crate::commands::shared::parse::parse_object;
use crate::context::AppContext;
use crate::output::output;
use crate::progress::Progress;

/// Handle `tally entity`.
pub async fn handle(action: &EntityCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        EntityCommands::Upsert { kind, id, payload } => {
            let payload = parse_object(payload, "payload")?;
            let entity = ctx.service.upsert_entity(&ctx.caller, kind, id, payload).await?;
            output(&entity, flags.format)
        }
        EntityCommands::Get { kind, id } => {
            let entity = ctx.service.get_entity(&ctx.caller, kind, id).await?;
            output(&entity, flags.format)
        }
    }
}

/// Handle `tally bulk-import`.
///
/// The whole file is parsed before anything is written, so a bad line
/// leaves the trail untouched.
pub async fn bulk_import(args: &BulkImportArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let rows = read_rows(&args.file)?;
    let progress = Progress::spinner(&format!("importing {} {} rows", rows.len(), args.kind));

    let imported = ctx.service.bulk_append(&ctx.caller, &args.kind, rows).await;
    progress.finish(&imported, |n| format!("imported {n} rows"), "import failed");
    let imported = imported
        .with_context(|| format!("bulk import of {} failed; nothing was written", args.file))?;

    let tail = ctx.service.chain_tail(&ctx.caller, ctx.caller.tenant_id()).await?;
    output(
        &json!({
            "entity_kind": args.kind,
            "rows": imported,
            "summary_seq": tail.seq,
        }),
        flags.format,
    )
}

fn read_rows(path: &str) -> anyhow::Result<Vec<EntityRow>> {
    serde_jsonlines::json_lines::<EntityRow, _>(path)
        .with_context(|| format!("failed to open {path}"))?
        .enumerate()
        .map(|(idx, row)| row.with_context(|| format!("{path}: line {} is not a valid entity row", idx + 1)))
        .collect()
}
