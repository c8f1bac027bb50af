//! Error aggregation and the result of one validation call.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::enums::{ErrorLevel, ValidationStatus};
use crate::error::FieldError;
use crate::path::DataPath;
use crate::types::FileMap;

/// Path-keyed, leveled error sink.
///
/// Adding the same `(path, message, level)` twice keeps one entry.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorSink {
    errors: BTreeMap<String, Vec<FieldError>>,
    fatal: bool,
}

impl ErrorSink {
    pub fn new() -> ErrorSink {
        ErrorSink::default()
    }

    pub fn add(&mut self, path: &DataPath, message: impl Into<String>, level: ErrorLevel) {
        self.add_at(path.to_string(), message.into(), level);
    }

    /// Records an error that aborts the call; it is kept at [`ErrorLevel::Unknown`].
    pub fn add_fatal(&mut self, path: &DataPath, message: impl Into<String>) {
        self.fatal = true;
        self.add_at(path.to_string(), message.into(), ErrorLevel::Unknown);
    }

    fn add_at(&mut self, path: String, message: String, level: ErrorLevel) {
        let entries = self.errors.entry(path).or_default();
        if !entries
            .iter()
            .any(|e| e.message == message && e.level == level)
        {
            entries.push(FieldError { message, level });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal
    }

    pub fn result(&self) -> ValidationStatus {
        if self.fatal {
            ValidationStatus::ErrorFatal
        } else if !self.errors.is_empty() {
            ValidationStatus::Error
        } else {
            ValidationStatus::Success
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<FieldError>> {
        &self.errors
    }

    /// The entry reported for `path`: lowest level wins, first added breaks ties.
    pub fn most_severe(&self, path: &str) -> Option<&FieldError> {
        self.errors
            .get(path)?
            .iter()
            .reduce(|best, e| if e.level < best.level { e } else { best })
    }

    /// One `"<path>: <message>"` line per path, using the most severe entry.
    pub fn global_messages(&self) -> Vec<String> {
        self.errors
            .keys()
            .filter_map(|path| {
                self.most_severe(path)
                    .map(|e| format!("{}: {}", path, e.message))
            })
            .collect()
    }
}

/// Outcome of [`crate::FormValidator::validate`].
///
/// On success `data` holds exactly the validated, normalized fields and
/// `files` the declared uploads. On any failure both are empty.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub data: Value,
    pub files: FileMap,
    pub errors: ErrorSink,
}

impl ValidationReport {
    pub(crate) fn new(sink: ErrorSink, data: Value, files: FileMap) -> ValidationReport {
        let status = sink.result();
        if status == ValidationStatus::Success {
            ValidationReport {
                status,
                data,
                files,
                errors: sink,
            }
        } else {
            ValidationReport {
                status,
                data: Value::Object(Map::new()),
                files: FileMap::new(),
                errors: sink,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ValidationStatus::Success
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<FieldError>> {
        self.errors.errors()
    }

    pub fn global_errors(&self) -> Vec<String> {
        self.errors.global_messages()
    }

    /// Validated data, or the error sink.
    pub fn into_result(self) -> Result<(Value, FileMap), ErrorSink> {
        if self.status == ValidationStatus::Success {
            Ok((self.data, self.files))
        } else {
            Err(self.errors)
        }
    }
}
