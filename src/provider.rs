//! Database schema lookups for the `db <table>.<field>` and `setting <name>`
//! type tokens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::enums::ColumnType;
use crate::error::{SchemaError, SchemaErrorKind};

/// Column description returned by a [`SchemaProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Maximum character length for `char`/`text` columns.
    #[serde(default)]
    pub length: Option<usize>,
}

impl ColumnSpec {
    pub fn new(column_type: ColumnType, length: Option<usize>) -> ColumnSpec {
        ColumnSpec {
            column_type,
            length,
        }
    }
}

/// Source of column metadata, consulted once at normalization time.
pub trait SchemaProvider {
    fn column(&self, table: &str, field: &str) -> Option<ColumnSpec>;

    fn setting(&self, name: &str) -> Option<ColumnSpec>;
}

/// Provider that knows no columns; every `db`/`setting` token fails.
pub struct NoSchema;

impl SchemaProvider for NoSchema {
    fn column(&self, _table: &str, _field: &str) -> Option<ColumnSpec> {
        None
    }

    fn setting(&self, _name: &str) -> Option<ColumnSpec> {
        None
    }
}

/// In-memory provider, typically loaded from YAML:
///
/// ```yaml
/// tables:
///   hosts:
///     hostid: { type: id }
///     host: { type: char, length: 128 }
/// settings:
///   default_theme: { type: char, length: 128 }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticSchema {
    #[serde(default)]
    pub tables: HashMap<String, HashMap<String, ColumnSpec>>,
    #[serde(default)]
    pub settings: HashMap<String, ColumnSpec>,
}

impl StaticSchema {
    pub fn from_yaml(input: &str) -> Result<StaticSchema, SchemaError> {
        serde_saphyr::from_str(input).map_err(|e| {
            SchemaError::new(
                SchemaErrorKind::Syntax,
                "",
                format!("invalid schema description: {}", e),
            )
        })
    }

    pub fn with_column(mut self, table: &str, field: &str, spec: ColumnSpec) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), spec);
        self
    }

    pub fn with_setting(mut self, name: &str, spec: ColumnSpec) -> Self {
        self.settings.insert(name.to_string(), spec);
        self
    }
}

impl SchemaProvider for StaticSchema {
    fn column(&self, table: &str, field: &str) -> Option<ColumnSpec> {
        self.tables.get(table)?.get(field).cloned()
    }

    fn setting(&self, name: &str) -> Option<ColumnSpec> {
        self.settings.get(name).cloned()
    }
}
