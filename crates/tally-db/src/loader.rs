//! Bulk loader: delimited file → existing relation.
//!
//! A blocking task parses the file with the `csv` crate and hands batches of
//! records to the async side over a bounded channel; the async side inserts
//! them with one prepared statement inside a single transaction. Any bad
//! record rolls the whole load back.

use std::path::Path;

use tally_core::{Ident, QualifiedName, sql};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DatabaseError;
use crate::finish;

/// One parsed data row with its 1-based source line.
struct Record {
    line: Option<u64>,
    values: Vec<libsql::Value>,
}

enum Chunk {
    Header(Vec<Ident>),
    Rows(Vec<Record>),
}

/// Why the parser stopped early.
struct ParseError {
    line: Option<u64>,
    reason: String,
}

pub(crate) async fn load(
    conn: &libsql::Connection,
    target: &QualifiedName,
    columns: &[Ident],
    source: &Path,
    delimiter: u8,
    batch_size: usize,
) -> Result<u64, DatabaseError> {
    let load_failure = |line: Option<u64>, reason: String| DatabaseError::LoadFailure {
        relation: target.to_string(),
        line,
        reason,
    };

    let (tx_chunks, mut rx_chunks) = mpsc::channel(batch_size.clamp(1, 64));
    let path = source.to_path_buf();
    let parser = tokio::task::spawn_blocking(move || parse(&path, delimiter, batch_size, &tx_chunks));

    let header = match rx_chunks.recv().await {
        Some(Ok(Chunk::Header(header))) => header,
        Some(Err(e)) => return Err(load_failure(e.line, e.reason)),
        Some(Ok(Chunk::Rows(_))) | None => {
            return Err(load_failure(None, "file has no header row".into()));
        }
    };
    if let Some(unknown) = header
        .iter()
        .find(|h| !columns.iter().any(|c| c.as_str().eq_ignore_ascii_case(h.as_str())))
    {
        return Err(load_failure(
            Some(1),
            format!("header column {unknown} is not a column of {target}"),
        ));
    }

    let insert = sql::insert_values(target, &header);
    debug!(statement = %insert, "bulk load");
    let tx = conn.transaction().await?;
    let result = async {
        let stmt = tx
            .prepare(insert.as_str())
            .await
            .map_err(|e| load_failure(Some(1), e.to_string()))?;
        let mut loaded = 0_u64;
        while let Some(chunk) = rx_chunks.recv().await {
            let rows = match chunk {
                Ok(Chunk::Rows(rows)) => rows,
                Ok(Chunk::Header(_)) => continue,
                Err(e) => return Err(load_failure(e.line, e.reason)),
            };
            for record in rows {
                stmt.execute(libsql::params_from_iter(record.values))
                    .await
                    .map_err(|e| load_failure(record.line, e.to_string()))?;
                stmt.reset();
                loaded += 1;
            }
        }
        Ok::<_, DatabaseError>(loaded)
    }
    .await;

    // Dropping the receiver stops a parser that is still running.
    drop(rx_chunks);
    if let Err(e) = parser.await {
        let err = load_failure(None, format!("parser task failed: {e}"));
        return finish(tx, Err(err)).await;
    }
    finish(tx, result).await
}

/// Parse `path`, sending the sanitized header first and then data rows in
/// batches. Stops at the first bad record or when the receiver goes away.
fn parse(
    path: &Path,
    delimiter: u8,
    batch_size: usize,
    out: &mpsc::Sender<Result<Chunk, ParseError>>,
) {
    let fail = |line, reason: String| {
        let _ = out.blocking_send(Err(ParseError { line, reason }));
    };

    let mut reader = match csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => return fail(None, format!("cannot open {}: {e}", path.display())),
    };

    let header = match reader.headers() {
        Ok(h) if h.iter().any(|f| !header_name(f).is_empty()) => {
            h.iter().map(|f| Ident::sanitized(header_name(f))).collect()
        }
        Ok(_) => return fail(Some(1), "header row is empty".into()),
        Err(e) => return fail(e.position().map(csv::Position::line), e.to_string()),
    };
    if out.blocking_send(Ok(Chunk::Header(header))).is_err() {
        return;
    }

    let mut batch = Vec::with_capacity(batch_size);
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => return fail(e.position().map(csv::Position::line), e.to_string()),
        };
        batch.push(Record {
            line: record.position().map(csv::Position::line),
            values: record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        libsql::Value::Null
                    } else {
                        libsql::Value::Text(field.to_string())
                    }
                })
                .collect(),
        });
        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if out.blocking_send(Ok(Chunk::Rows(full))).is_err() {
                return;
            }
        }
    }
    if !batch.is_empty() {
        let _ = out.blocking_send(Ok(Chunk::Rows(batch)));
    }
}

fn header_name(field: &str) -> &str {
    field.trim_start_matches('\u{feff}').trim().trim_matches('"')
}
