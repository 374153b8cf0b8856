use tally_core::AuditRecord;
use tally_db::{CaptureBinding, InferReport, UpsertReport};

use super::{Layout, Tabular};

/// A result type listed one record per table row.
pub trait TableRow {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

impl<T: TableRow> Tabular for Vec<T> {
    fn layout(&self) -> Layout {
        Layout::Rows {
            headers: T::HEADERS,
            rows: self.iter().map(TableRow::cells).collect(),
        }
    }
}

/// Cell formatting shared by every view.
pub mod cell {
    use chrono::{DateTime, SecondsFormat, Utc};
    use tally_core::RowImage;

    /// Compact JSON, or `-` when the image is absent.
    #[must_use]
    pub fn image(image: Option<&RowImage>) -> String {
        image
            .and_then(|image| serde_json::to_string(image).ok())
            .unwrap_or_else(|| String::from("-"))
    }

    #[must_use]
    pub fn timestamp(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    #[must_use]
    pub fn list(items: &[String]) -> String {
        items.join(", ")
    }
}

impl TableRow for AuditRecord {
    const HEADERS: &'static [&'static str] = &[
        "log_id",
        "subject_id",
        "operation",
        "captured_at",
        "old_image",
        "new_image",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.log_id.to_string(),
            self.subject_id.to_string(),
            self.operation.to_string(),
            cell::timestamp(&self.captured_at),
            cell::image(self.old_image.as_ref()),
            cell::image(self.new_image.as_ref()),
        ]
    }
}

impl Tabular for CaptureBinding {
    fn layout(&self) -> Layout {
        Layout::Record(vec![
            ("table", self.table.to_string()),
            ("key_column", self.key_column.to_string()),
            ("audit_table", self.audit_table.to_string()),
            ("created_at", cell::timestamp(&self.created_at)),
        ])
    }
}

impl Tabular for InferReport {
    fn layout(&self) -> Layout {
        Layout::Record(vec![
            ("table", self.table.clone()),
            ("columns", cell::list(&self.columns)),
            ("rows_loaded", self.rows_loaded.to_string()),
            ("dropped_existing", self.dropped_existing.to_string()),
        ])
    }
}

impl Tabular for UpsertReport {
    fn layout(&self) -> Layout {
        Layout::Record(vec![
            ("target", self.target.clone()),
            ("staging", self.staging.clone()),
            ("rows_staged", self.rows_staged.to_string()),
            ("inserted", self.inserted.to_string()),
            ("updated", self.updated.to_string()),
            ("staging_dropped", self.staging_dropped.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tally_core::RowImage;

    use super::*;

    #[test]
    fn absent_image_is_a_dash() {
        assert_eq!(cell::image(None), "-");
        let image: RowImage = serde_json::from_value(json!({"id": 1, "note": null})).unwrap();
        assert_eq!(cell::image(Some(&image)), r#"{"id":1,"note":null}"#);
    }

    #[test]
    fn infer_report_joins_columns() {
        let report = InferReport {
            table: "main.people".into(),
            columns: vec!["id".into(), "name".into()],
            rows_loaded: 2,
            dropped_existing: false,
        };
        let Layout::Record(fields) = report.layout() else {
            panic!("expected a record layout");
        };
        assert_eq!(fields[1], ("columns", String::from("id, name")));
    }
}
