//! Command results on stdout.
//!
//! JSON and raw output come straight from `Serialize`. Table output comes
//! from [`Tabular`], which each result type implements with its columns in
//! the order an operator reads them.

use serde::Serialize;

use crate::cli::{GlobalFlags, OutputFormat};

pub mod table;
mod views;

pub use views::TableRow;

/// How a result is laid out as a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// One result, shown as a field/value line per field.
    Record(Vec<(&'static str, String)>),
    /// A result set under shared headers.
    Rows {
        headers: &'static [&'static str],
        rows: Vec<Vec<String>>,
    },
}

pub trait Tabular {
    fn layout(&self) -> Layout;
}

/// Render a command result in the requested format.
pub fn render<T: Serialize + Tabular>(
    value: &T,
    format: OutputFormat,
    options: table::TableOptions,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Table => Ok(render_layout(value.layout(), options)),
        OutputFormat::Raw => Ok(serde_json::to_string(value)?),
    }
}

/// Print a command result in the format selected by `flags`.
pub fn output<T: Serialize + Tabular>(value: &T, flags: &GlobalFlags) -> anyhow::Result<()> {
    let rendered = render(value, flags.format, table::TableOptions::for_stdout(flags))?;
    println!("{rendered}");
    Ok(())
}

fn render_layout(layout: Layout, options: table::TableOptions) -> String {
    match layout {
        Layout::Record(fields) => {
            let rows = fields
                .into_iter()
                .map(|(field, value)| vec![field.to_string(), value])
                .collect::<Vec<_>>();
            table::render_rows(&["field", "value"], &rows, options)
        }
        Layout::Rows { rows, .. } if rows.is_empty() => String::from("(no rows)"),
        Layout::Rows { headers, rows } => table::render_rows(headers, &rows, options),
    }
}
