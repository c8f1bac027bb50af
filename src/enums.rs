//! Closed enumerations used throughout the rule engine.
//!
//! These are "closed" enums: only the defined variants are valid. Anything
//! open-ended (validator names, API methods, db columns) stays a string and is
//! checked against a registry or provider at normalization time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a rule row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Boolean,
    Integer,
    Float,
    String,
    Id,
    Object,
    Objects,
    Array,
    File,
}

impl RuleType {
    /// Parse a positional or keyed type token.
    pub fn from_token(token: &str) -> Option<RuleType> {
        match token {
            "boolean" => Some(RuleType::Boolean),
            "integer" => Some(RuleType::Integer),
            "float" => Some(RuleType::Float),
            "string" => Some(RuleType::String),
            "id" => Some(RuleType::Id),
            "object" => Some(RuleType::Object),
            "objects" => Some(RuleType::Objects),
            "array" => Some(RuleType::Array),
            "file" => Some(RuleType::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Boolean => "boolean",
            RuleType::Integer => "integer",
            RuleType::Float => "float",
            RuleType::String => "string",
            RuleType::Id => "id",
            RuleType::Object => "object",
            RuleType::Objects => "objects",
            RuleType::Array => "array",
            RuleType::File => "file",
        }
    }

    /// Types whose cached value is the raw scalar rather than an emptiness flag.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            RuleType::Boolean | RuleType::Integer | RuleType::Float | RuleType::String | RuleType::Id
        )
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error level. Declaration order is severity order: lower sorts first and wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    Primary,
    Delayed,
    LocalUniq,
    RemoteUniq,
    Unknown,
}

/// Overall verdict of one `validate()` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Success,
    Error,
    ErrorFatal,
}

/// Content check applied to uploaded files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    #[default]
    File,
    Image,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Image => "image",
        }
    }
}

/// Storage type of a database column, as reported by a [`crate::provider::SchemaProvider`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Id,
    Int,
    Char,
    Text,
    Float,
    Blob,
}
