use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::enums::ErrorLevel;

/// Error kind for schema (rule-authoring) failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaErrorKind {
    Syntax,
    MissingType,
    DuplicateRule,
    UnknownRule,
    Incompatible,
    InvalidValue,
    InvalidRegex,
    UnknownReference,
    UnknownColumn,
    UnknownValidator,
}

/// Produced while building a rule tree. Never shown to end users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[RULES ERROR] {message} (Path: {path})")]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub path: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(kind: SchemaErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaError {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// One data-validation failure attached to a path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub message: String,
    pub level: ErrorLevel,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Failure reported by the remote existence service (transport, auth, backend).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        BackendError {
            message: message.into(),
        }
    }
}
