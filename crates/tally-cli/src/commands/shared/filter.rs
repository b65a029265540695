use tally_core::enums::Severity;
use tally_db::repos::RecordFilter;

use crate::cli::root_commands::FilterArgs;
use crate::commands::shared::parse::{parse_enum, parse_optional_time};

/// Build a record filter from command-line flags.
pub fn record_filter(args: &FilterArgs, limit: Option<u32>) -> anyhow::Result<RecordFilter> {
    Ok(RecordFilter {
        tenant: args.scope.clone(),
        from: parse_optional_time(args.from.as_deref(), "from")?,
        to: parse_optional_time(args.to.as_deref(), "to")?,
        event_type: args.event.clone(),
        severity: args
            .severity
            .as_deref()
            .map(|raw| parse_enum::<Severity>(raw, "severity"))
            .transpose()?,
        entity_type: args.entity_type.clone(),
        entity_id: args.entity_id.clone(),
        include_shared: args.include_shared,
        limit,
    })
}
