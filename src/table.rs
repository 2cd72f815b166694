use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{record::Record, schema::ColumnSchema};

/// Placeholder rendered for empty cells so sparse rows stay readable.
const EMPTY_CELL: &str = "-";

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
        }
    }
    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

/// Renders records against the first `max_columns` schema columns, adding a
/// trailing `+N more` column when the schema is wider.
pub fn render_records<'a, I>(schema: &ColumnSchema, records: I, max_columns: usize) -> String
where
    I: IntoIterator<Item = &'a Record>,
{
    let shown = schema.columns().iter().take(max_columns).cloned().collect::<Vec<_>>();
    let hidden = schema.len().saturating_sub(shown.len());
    let mut headers = shown.clone();
    if hidden > 0 {
        headers.push(format!("+{hidden} more"));
    }

    let rows = records
        .into_iter()
        .map(|record| {
            let mut cells = shown
                .iter()
                .map(|column| match record.get(column) {
                    "" => EMPTY_CELL.to_string(),
                    value => value.to_string(),
                })
                .collect::<Vec<_>>();
            if hidden > 0 {
                cells.push("...".to_string());
            }
            cells
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let sanitized = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&sanitized));
            format!("{sanitized}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}
