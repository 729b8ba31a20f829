//! Output formatting for query results.
//!
//! Tables can be rendered as JSON, as an ASCII grid in the style of the
//! MySQL command-line client, or as a Markdown table.

use crate::models::DataTable;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Markdown table format
    Markdown,
}

/// Render `table` in the requested format.
pub fn render(table: &DataTable, format: OutputFormat, execution_time_ms: u64) -> String {
    match format {
        OutputFormat::Json => format_as_json(table),
        OutputFormat::Table => format_as_table(table, execution_time_ms),
        OutputFormat::Markdown => format_as_markdown(table),
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_as_json(table: &DataTable) -> String {
    serde_json::to_string_pretty(&table.rows).unwrap_or_else(|_| "[]".to_string())
}

/// Pad `text` to `width` display columns.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

pub fn format_as_table(table: &DataTable, execution_time_ms: u64) -> String {
    if table.columns.is_empty() {
        return "Empty set".to_string();
    }

    let names = table.column_names();
    let cells: Vec<Vec<(String, bool)>> = table
        .iter()
        .map(|row| {
            row.values()
                .iter()
                .map(|v| (format_value(v), matches!(v, JsonValue::Number(_))))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = names.iter().map(|n| n.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(text.width());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = names
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("| {} ", pad(name, *w, false)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in &cells {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|((text, numeric), w)| format!("| {} ", pad(text, *w, *numeric)))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);

    let row_count = table.row_count();
    let row_text = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        row_text,
        execution_time_ms as f64 / 1000.0
    ));

    output
}

pub fn format_as_markdown(table: &DataTable) -> String {
    if table.columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();

    let header: String = table
        .column_names()
        .iter()
        .map(|name| format!("| {} ", escape_markdown(name)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = table.columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in table {
        let line: String = row
            .values()
            .iter()
            .map(|v| format!("| {} ", escape_markdown(&format_value(v))))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{} rows*", table.row_count()));

    output
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
