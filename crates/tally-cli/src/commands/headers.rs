use std::path::Path;

use serde::Serialize;
use tally_config::TallyConfig;
use tally_core::{header, sanitize};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::HeadersArgs;
use crate::commands::shared::parse;
use crate::output::{TableRow, output};

#[derive(Debug, Serialize)]
pub struct HeaderColumn {
    pub position: usize,
    pub raw: String,
    pub column: String,
}

impl TableRow for HeaderColumn {
    const HEADERS: &'static [&'static str] = &["position", "raw", "column"];

    fn cells(&self) -> Vec<String> {
        vec![self.position.to_string(), self.raw.clone(), self.column.clone()]
    }
}

/// Handle `tally headers`.
pub fn handle(args: &HeadersArgs, config: &TallyConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let delimiter = parse::delimiter(args.delimiter, config.ingest.delimiter)?;
    let columns = preview(Path::new(&args.file), delimiter)?;
    output(&columns, flags)
}

pub fn preview(path: &Path, delimiter: char) -> anyhow::Result<Vec<HeaderColumn>> {
    let raw = header::read_raw_header(path, delimiter)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| HeaderColumn {
            position: idx + 1,
            column: sanitize(&raw),
            raw,
        })
        .collect())
}
