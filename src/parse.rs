use serde_json::Value;

use crate::error::{SchemaError, SchemaErrorKind};

/// Parse a YAML or JSON rule description into the raw DSL value.
///
/// Performs deserialization only. The result still has to go through
/// [`crate::normalize::normalize`] before it can validate anything.
pub fn parse_rules(input: &str) -> Result<Value, SchemaError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(syntax("empty input"));
    }

    // JSON is tried first: flow-style YAML accepts most JSON, but reports
    // errors in terms of YAML.
    let value: Value = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => from_yaml(input)?,
        }
    } else {
        from_yaml(input)?
    };

    if !(value.is_object() || value.is_array()) {
        return Err(SchemaError::new(
            SchemaErrorKind::Syntax,
            "/",
            "rule description root must be a mapping or a sequence",
        ));
    }

    Ok(value)
}

fn from_yaml(input: &str) -> Result<Value, SchemaError> {
    check_multi_document(input)?;
    serde_saphyr::from_str(input).map_err(|e| syntax(&e.to_string()))
}

/// Only matches `---` at column 0 to avoid false positives inside block scalars.
fn check_multi_document(input: &str) -> Result<(), SchemaError> {
    let markers = input
        .lines()
        .filter(|line| line.starts_with("---") && line[3..].trim().is_empty())
        .count();
    if markers > 1 {
        return Err(syntax("multi-document YAML is not supported"));
    }
    Ok(())
}

fn syntax(message: &str) -> SchemaError {
    SchemaError::new(SchemaErrorKind::Syntax, "", message)
}
