//! Header-line parsing for delimited files.
//!
//! Only the first line is read. It is split with the same `csv` rules the
//! loader applies, so a quoted field may contain the delimiter. Fields are
//! trimmed of whitespace; the raw names are then sanitized.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::CoreError;
use crate::ident::Ident;

const BOM: char = '\u{feff}';

/// Read the raw (unsanitized) header names from the first line of `path`.
///
/// # Errors
///
/// Returns `CoreError::Unreadable` if the file cannot be opened or read, and
/// `CoreError::InvalidInput` if the first line is empty or holds an empty field.
pub fn read_raw_header(path: &Path, delimiter: char) -> Result<Vec<String>, CoreError> {
    let file = File::open(path).map_err(|source| CoreError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(|source| CoreError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

    parse_header_line(&line, delimiter)
        .map_err(|reason| CoreError::InvalidInput(format!("{}: {reason}", path.display())))
}

/// Read and sanitize the header of `path`.
///
/// # Errors
///
/// See [`read_raw_header`].
pub fn read_header(path: &Path, delimiter: char) -> Result<Vec<Ident>, CoreError> {
    Ok(read_raw_header(path, delimiter)?
        .iter()
        .map(|raw| Ident::sanitized(raw))
        .collect())
}

fn parse_header_line(line: &str, delimiter: char) -> Result<Vec<String>, String> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| format!("delimiter {delimiter:?} is not a single ASCII character"))?;
    let line = line
        .trim_start_matches(BOM)
        .trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err("header line is empty".into());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let record = match reader.records().next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => return Err(format!("header line is malformed: {e}")),
        None => return Err("header line is empty".into()),
    };

    record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            if field.is_empty() {
                Err(format!("header field {} is empty", idx + 1))
            } else {
                Ok(field.to_string())
            }
        })
        .collect()
}
