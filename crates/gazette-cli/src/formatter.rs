//! Output formatting for newsletters and change events.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::Value;

use crate::client::Newsletter;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a list of newsletters.
pub fn format_newsletters(rows: &[Newsletter], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows).unwrap_or_default(),
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No newsletters".to_string();
            }
            let mut table = Table::new();
            table.set_header(vec!["id", "title", "content", "created_at"]);
            for row in rows {
                table.add_row(vec![
                    Cell::new(row.id),
                    Cell::new(&row.title),
                    Cell::new(&row.content),
                    Cell::new(&row.created_at),
                ]);
            }
            table.to_string()
        }
    }
}

/// Render one change event body received from the stream.
pub fn format_event(body: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => body.to_string(),
        OutputFormat::Table => {
            let operation = body
                .get("operation")
                .and_then(Value::as_str)
                .unwrap_or("CHANGE");
            let id = body.get("id").map(Value::to_string).unwrap_or_default();
            let title = body.get("title").and_then(Value::as_str).unwrap_or("");
            let content = body.get("content").and_then(Value::as_str).unwrap_or("");
            format!("[{operation}] #{id} {title}: {content}")
        }
    }
}
