//! Row and value conversion helpers.
//!
//! Row images travel as JSON objects, so every `libsql::Value` read back from a
//! mutation or an audit row passes through here. Also handles the dual
//! datetime format issue (`SQLite`'s `datetime('now')` vs RFC 3339).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use tally_core::RowImage;

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00.123Z"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Read a nullable TEXT column.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    Ok(row.get::<Option<String>>(idx)?)
}

/// Parse an optional JSON object column into a row image.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the text is not a JSON object.
pub fn parse_optional_image(s: Option<&str>) -> Result<Option<RowImage>, DatabaseError> {
    s.map(|s| {
        serde_json::from_str(s)
            .map_err(|e| DatabaseError::Query(format!("Invalid row image in audit column: {e}")))
    })
    .transpose()
}

/// Store value to its JSON form. Blobs become base64 text; non-finite reals
/// become `null`.
#[must_use]
pub fn value_to_json(value: libsql::Value) -> Json {
    match value {
        libsql::Value::Null => Json::Null,
        libsql::Value::Integer(i) => Json::from(i),
        libsql::Value::Real(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        libsql::Value::Text(s) => Json::String(s),
        libsql::Value::Blob(b) => Json::String(STANDARD.encode(b)),
    }
}

/// JSON value to a bindable store value. Booleans bind as 0/1; arrays and
/// objects bind as their JSON text.
#[must_use]
pub fn json_to_value(value: &Json) -> libsql::Value {
    match value {
        Json::Null => libsql::Value::Null,
        Json::Bool(b) => libsql::Value::Integer(i64::from(*b)),
        Json::Number(n) => n.as_i64().map_or_else(
            || libsql::Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            libsql::Value::Integer,
        ),
        Json::String(s) => libsql::Value::Text(s.clone()),
        other => libsql::Value::Text(other.to_string()),
    }
}

/// Drain a result set into row images keyed by column name.
///
/// # Errors
///
/// Returns `DatabaseError` if stepping the statement fails.
pub async fn collect_images(mut rows: libsql::Rows) -> Result<Vec<RowImage>, DatabaseError> {
    let names: Vec<String> = (0..rows.column_count())
        .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
        .collect();

    let mut images = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut image = RowImage::new();
        for (idx, name) in (0_i32..).zip(&names) {
            image.insert(name.clone(), value_to_json(row.get_value(idx)?));
        }
        images.push(image);
    }
    Ok(images)
}

/// Message text of a libSQL error, for matching well-known `SQLite` failures.
pub(crate) fn error_message(err: &libsql::Error) -> String {
    match err {
        libsql::Error::SqliteFailure(_, msg) => msg.clone(),
        other => other.to_string(),
    }
}
