use serde_json::Value;
use tally_core::Ident;

/// Resolve the delimiter for a command: local arg, else the configured one.
/// Only single ASCII characters are accepted.
pub fn delimiter(local: Option<char>, configured: char) -> anyhow::Result<char> {
    let delimiter = local.unwrap_or(configured);
    if !delimiter.is_ascii() {
        anyhow::bail!("invalid delimiter {delimiter:?}: must be a single ASCII character");
    }
    Ok(delimiter)
}

/// Parse a command-line value: JSON numbers and `null` keep their type,
/// anything else is text.
#[must_use]
pub fn value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(parsed @ (Value::Number(_) | Value::Null)) => parsed,
        _ => Value::String(raw.to_string()),
    }
}

/// Parse a `col=value` assignment. The column must be a valid identifier.
pub fn assignment(raw: &str) -> anyhow::Result<(Ident, Value)> {
    let Some((column, rest)) = raw.split_once('=') else {
        anyhow::bail!("invalid assignment '{raw}': expected col=value");
    };
    let column = Ident::new(column.trim())
        .map_err(|error| anyhow::anyhow!("invalid assignment '{raw}': {error}"))?;
    Ok((column, value(rest)))
}

/// Parse every assignment, rejecting a column named twice.
pub fn assignments(raw: &[String]) -> anyhow::Result<Vec<(Ident, Value)>> {
    let mut parsed: Vec<(Ident, Value)> = Vec::with_capacity(raw.len());
    for item in raw {
        let (column, value) = assignment(item)?;
        if parsed
            .iter()
            .any(|(seen, _)| seen.as_str().eq_ignore_ascii_case(column.as_str()))
        {
            anyhow::bail!("column '{column}' is assigned more than once");
        }
        parsed.push((column, value));
    }
    Ok(parsed)
}

/// Parse a column name argument.
pub fn column(raw: &str) -> anyhow::Result<Ident> {
    Ident::new(raw).map_err(|error| anyhow::anyhow!("invalid column '{raw}': {error}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("17", json!(17))]
    #[case("-2.5", json!(-2.5))]
    #[case("null", Value::Null)]
    #[case("007", json!("007"))]
    #[case("true", json!("true"))]
    #[case("Ann Lee", json!("Ann Lee"))]
    #[case("", json!(""))]
    fn values_keep_numbers_and_null(#[case] raw: &str, #[case] expected: Value) {
        assert_eq!(value(raw), expected);
    }

    #[test]
    fn assignment_splits_on_first_equals() {
        let (column, value) = assignment("note=a=b").expect("assignment should parse");
        assert_eq!(column.as_str(), "note");
        assert_eq!(value, json!("a=b"));
    }

    #[rstest]
    #[case("no_equals")]
    #[case("=5")]
    #[case("bad col=5")]
    fn malformed_assignments_are_rejected(#[case] raw: &str) {
        assert!(assignment(raw).is_err());
    }

    #[test]
    fn repeated_column_is_rejected() {
        let raw = vec!["name=a".to_string(), "NAME=b".to_string()];
        let err = assignments(&raw).expect_err("should fail");
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn delimiter_prefers_local_and_rejects_non_ascii() {
        assert_eq!(delimiter(Some(';'), ',').expect("ascii"), ';');
        assert_eq!(delimiter(None, '\t').expect("ascii"), '\t');
        assert!(delimiter(Some('§'), ',').is_err());
    }
}
