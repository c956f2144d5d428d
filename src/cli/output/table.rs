//! Table output formatting for CLI commands
//!
//! Renders entity records and orchestrator counters using comfy-table.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde_json::Value;

use crate::domain::models::Item;
use crate::services::QueryStats;

/// Most columns shown for a record table; the rest are only in `--json` output.
const MAX_COLUMNS: usize = 6;
const MAX_CELL_WIDTH: usize = 40;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format records as a table
    ///
    /// Columns come from the first record's fields, `id` first.
    pub fn format_items(&self, items: &[Item]) -> String {
        let columns = item_columns(items);
        let mut table = self.create_base_table();

        table.set_header(
            columns
                .iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );

        for item in items {
            let row = columns.iter().map(|name| {
                let text = item
                    .get(name.as_str())
                    .map_or_else(|| "-".to_string(), render_value);
                let cell = Cell::new(truncate_text(&text, MAX_CELL_WIDTH));
                if self.use_colors && name == "id" {
                    cell.fg(Color::Cyan)
                } else {
                    cell
                }
            });
            table.add_row(row.collect::<Vec<_>>());
        }

        table.to_string()
    }

    /// Format orchestrator counters as a two-column table
    pub fn format_stats(&self, stats: &QueryStats) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            Cell::new("Counter").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        for (name, value) in [
            ("cache hits", stats.cache_hits),
            ("cache misses", stats.cache_misses),
            ("coalesced", stats.coalesced),
            ("backend calls", stats.backend_calls),
            ("rate limit retries", stats.rate_limit_retries),
        ] {
            table.add_row(vec![Cell::new(name), Cell::new(value)]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn item_columns(items: &[Item]) -> Vec<String> {
    let Some(first) = items.first() else {
        return Vec::new();
    };

    let mut columns: Vec<String> = Vec::with_capacity(MAX_COLUMNS);
    if first.contains_key("id") {
        columns.push("id".to_string());
    }
    columns.extend(
        first
            .keys()
            .filter(|key| key.as_str() != "id")
            .take(MAX_COLUMNS - columns.len())
            .cloned(),
    );
    columns
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

/// Truncate to `max_len` characters, appending "..." when shortened
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
