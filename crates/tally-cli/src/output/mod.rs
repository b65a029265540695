use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::ui;

pub mod table;

/// Columns shown first in tables when present, in this order.
const LEADING_COLUMNS: &[&str] = &[
    "seq",
    "id",
    "record_id",
    "token",
    "tenant_id",
    "event_type",
    "severity",
    "similarity",
    "action",
    "outcome",
];

/// Nested values longer than this are elided in table cells.
const MAX_CELL_JSON: usize = 60;

/// Render a serializable response to a string in the requested format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Table => render_table(&serde_json::to_value(value)?),
        OutputFormat::Raw => Ok(serde_json::to_string(value)?),
    }
}

/// Print a serializable response in the requested format.
pub fn output<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(value, format)?;
    println!("{rendered}");
    Ok(())
}

fn options() -> table::TableOptions {
    let prefs = ui::prefs();
    table::TableOptions {
        max_width: prefs.term_width,
        color: prefs.table_color,
    }
}

fn render_table(value: &Value) -> anyhow::Result<String> {
    match value {
        Value::Array(items) => Ok(render_rows(items)),
        Value::Object(map) => {
            let rows = map
                .iter()
                .map(|(key, value)| vec![key.clone(), value_to_cell(value)])
                .collect::<Vec<_>>();
            Ok(table::render_entity_table(&["field", "value"], &rows, options()))
        }
        scalar => Ok(value_to_cell(scalar)),
    }
}

fn render_rows(items: &[Value]) -> String {
    if items.is_empty() {
        return String::from("(no rows)");
    }
    if !items.iter().all(Value::is_object) {
        let rows = items.iter().map(|item| vec![value_to_cell(item)]).collect::<Vec<_>>();
        return table::render_entity_table(&["value"], &rows, options());
    }

    let headers = column_order(items);
    let header_refs = headers.iter().map(String::as_str).collect::<Vec<_>>();
    let rows = items
        .iter()
        .filter_map(Value::as_object)
        .map(|map| {
            headers
                .iter()
                .map(|header| map.get(header).map_or_else(|| String::from("-"), value_to_cell))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    table::render_entity_table(&header_refs, &rows, options())
}

fn column_order(items: &[Value]) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for key in items.iter().filter_map(Value::as_object).flat_map(|map| map.keys()) {
        if !seen.contains(key) {
            seen.push(key.clone());
        }
    }
    let mut headers: Vec<String> = LEADING_COLUMNS
        .iter()
        .filter(|c| seen.iter().any(|s| s == *c))
        .map(|c| (*c).to_string())
        .collect();
    headers.extend(seen.into_iter().filter(|s| !LEADING_COLUMNS.contains(&s.as_str())));
    headers
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        other => {
            let json = serde_json::to_string(other).unwrap_or_else(|_| String::from("<invalid-json>"));
            if json.chars().count() > MAX_CELL_JSON {
                let head: String = json.chars().take(MAX_CELL_JSON - 1).collect();
                format!("{head}…")
            } else {
                json
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use serde_json::json;

    use super::{column_order, render, value_to_cell};
    use crate::cli::OutputFormat;

    #[derive(Serialize)]
    struct Hit {
        record_id: &'static str,
        similarity: f32,
    }

    #[test]
    fn raw_render_is_single_line_json() {
        let out = render(&Hit { record_id: "aud-1", similarity: 0.5 }, OutputFormat::Raw).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["record_id"], "aud-1");
        assert!(!out.contains('\n'));
    }

    #[test]
    fn table_lists_rows_under_headers() {
        let hits = vec![
            Hit { record_id: "aud-1", similarity: 0.5 },
            Hit { record_id: "aud-2", similarity: 0.25 },
        ];
        let out = render(&hits, OutputFormat::Table).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("record_id"));
        assert!(lines[2].contains("aud-1"));
    }

    #[test]
    fn leading_columns_come_first() {
        let items = vec![json!({ "actor_id": "u", "tenant_id": "acme", "seq": 3 })];
        assert_eq!(column_order(&items), vec!["seq", "tenant_id", "actor_id"]);
    }

    #[test]
    fn long_nested_values_are_elided() {
        let cell = value_to_cell(&json!({ "note": "x".repeat(200) }));
        assert_eq!(cell.chars().count(), 60);
        assert!(cell.ends_with('…'));
        assert_eq!(value_to_cell(&json!(null)), "-");
    }

    #[test]
    fn empty_array_renders_placeholder() {
        let out = render(&Vec::<Hit>::new(), OutputFormat::Table).unwrap();
        assert_eq!(out, "(no rows)");
    }
}
