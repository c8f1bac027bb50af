use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::enums::*;

// ─── Patterns ───────────────────────────────────────────────────────────────

/// A compiled regular expression that remembers its source text.
///
/// Sources may be written bare (`^[a-z]+$`) or delimited with trailing flags
/// (`/^[a-z]+$/i`). Two patterns are equal when their sources are equal.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Pattern, regex::Error> {
        let regex = Regex::new(&translate_delimited(source))?;
        Ok(Pattern {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// `/body/flags` → `(?flags)body`; anything else is passed through.
fn translate_delimited(source: &str) -> String {
    if let Some(rest) = source.strip_prefix('/')
        && let Some(end) = rest.rfind('/')
    {
        let (body, flags) = (&rest[..end], &rest[end + 1..]);
        if flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u')) {
            let flags: String = flags.chars().filter(|c| *c != 'u').collect();
            return if flags.is_empty() {
                body.to_string()
            } else {
                format!("(?{}){}", flags, body)
            };
        }
    }
    source.to_string()
}

// ─── Value sets ─────────────────────────────────────────────────────────────

/// One entry of an `in`/`not_in` list.
#[derive(Clone, Debug, PartialEq)]
pub enum InOption {
    Scalar(Value),
    /// Inclusive range; a missing bound is open.
    Range {
        from: Option<Number>,
        to: Option<Number>,
    },
}

impl fmt::Display for InOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InOption::Scalar(Value::String(s)) => write!(f, "{}", s),
            InOption::Scalar(v) => write!(f, "{}", v),
            InOption::Range { from, to } => {
                if let Some(from) = from {
                    write!(f, "{}", from)?;
                }
                f.write_str(":")?;
                if let Some(to) = to {
                    write!(f, "{}", to)?;
                }
                Ok(())
            }
        }
    }
}

/// Allowed or forbidden value set.
#[derive(Clone, Debug, PartialEq)]
pub enum Membership {
    In(Vec<InOption>),
    NotIn(Vec<InOption>),
}

impl Membership {
    pub fn options(&self) -> &[InOption] {
        match self {
            Membership::In(options) | Membership::NotIn(options) => options,
        }
    }

    /// Name of the check, as used for `messages` overrides.
    pub fn check_name(&self) -> &'static str {
        match self {
            Membership::In(_) => "in",
            Membership::NotIn(_) => "not_in",
        }
    }
}

// ─── Rule tree ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumberRule {
    pub membership: Option<Membership>,
    pub min: Option<Number>,
    pub max: Option<Number>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringRule {
    pub not_empty: bool,
    pub allow_macro: bool,
    pub length: Option<usize>,
    pub regex: Option<Pattern>,
    pub membership: Option<Membership>,
    pub use_rule: Option<UseRule>,
}

/// Delegation to a named validator from the [`crate::registry::ValidatorRegistry`].
#[derive(Clone, Debug, PartialEq)]
pub struct UseRule {
    pub name: String,
    pub options: Value,
    pub min: Option<Number>,
    pub max: Option<Number>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectRule {
    pub fields: Vec<FieldSpec>,
    pub api_uniq: Vec<ApiUniqCheck>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectsRule {
    pub fields: Vec<FieldSpec>,
    pub not_empty: bool,
    /// Independent uniqueness constraints, each a list of key names.
    pub uniq: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayRule {
    pub element: Option<Box<Rule>>,
    pub not_empty: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileRule {
    pub not_empty: bool,
    pub max_size: Option<u64>,
    pub file_type: FileType,
}

/// Type-specific part of a rule row. Exactly one type per row.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleKind {
    Boolean,
    Integer(NumberRule),
    Float(NumberRule),
    String(StringRule),
    Id,
    Object(ObjectRule),
    Objects(ObjectsRule),
    Array(ArrayRule),
    File(FileRule),
}

impl RuleKind {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleKind::Boolean => RuleType::Boolean,
            RuleKind::Integer(_) => RuleType::Integer,
            RuleKind::Float(_) => RuleType::Float,
            RuleKind::String(_) => RuleType::String,
            RuleKind::Id => RuleType::Id,
            RuleKind::Object(_) => RuleType::Object,
            RuleKind::Objects(_) => RuleType::Objects,
            RuleKind::Array(_) => RuleType::Array,
            RuleKind::File(_) => RuleType::File,
        }
    }

    /// Declared fields of `object`/`objects` rows.
    pub fn fields(&self) -> Option<&[FieldSpec]> {
        match self {
            RuleKind::Object(rule) => Some(&rule.fields),
            RuleKind::Objects(rule) => Some(&rule.fields),
            _ => None,
        }
    }
}

/// One canonical rule row.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub kind: RuleKind,
    pub required: bool,
    /// All conditions must hold for the row to apply.
    pub when: Vec<WhenRule>,
    pub messages: BTreeMap<String, String>,
    pub default: Option<Value>,
    pub default_source: Option<String>,
}

impl Rule {
    pub fn new(kind: RuleKind) -> Rule {
        Rule {
            kind,
            required: false,
            when: Vec::new(),
            messages: BTreeMap::new(),
            default: None,
            default_source: None,
        }
    }

    pub fn rule_type(&self) -> RuleType {
        self.kind.rule_type()
    }

    /// Custom text for `check` if the schema overrides it, otherwise `default`.
    pub fn message(&self, check: &str, default: impl Into<String>) -> String {
        match self.messages.get(check) {
            Some(text) => text.clone(),
            None => default.into(),
        }
    }

    /// Whether this row is macro-capable, which changes how uniqueness compares it.
    pub fn allows_macro(&self) -> bool {
        matches!(&self.kind, RuleKind::String(rule) if rule.allow_macro)
    }
}

/// A declared field: its alternative rule rows plus field-level options.
///
/// An empty `rules` list lets the field through unchecked.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub rules: Vec<Rule>,
    pub deprecated: bool,
    pub replacement: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            rules: Vec::new(),
            deprecated: false,
            replacement: None,
        }
    }
}

/// `[field_ref, predicate]`.
#[derive(Clone, Debug, PartialEq)]
pub struct WhenRule {
    pub field: String,
    pub predicate: WhenPredicate,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WhenPredicate {
    Exists,
    NotExists,
    Empty,
    NotEmpty,
    Type(RuleType),
    In(Vec<InOption>),
    NotIn(Vec<InOption>),
    Regex(Pattern),
}

/// Remote uniqueness check descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiUniqCheck {
    /// `<resource>.<verb>`, e.g. `host.get`.
    pub method: String,
    /// Filter values; strings shaped `{field_ref}` are templates.
    pub filter: Map<String, Value>,
    pub exclude_id: Option<String>,
    /// Extra request parameters, templated like `filter`.
    pub params: Map<String, Value>,
}

impl ApiUniqCheck {
    pub fn resource(&self) -> &str {
        self.method.split('.').next().unwrap_or(&self.method)
    }
}

/// Field reference inside a `{field_ref}` template string.
pub fn template_reference(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix('{'))
        .and_then(|s| s.strip_suffix('}'))
        .filter(|s| !s.is_empty())
}

// ─── Uploaded files ─────────────────────────────────────────────────────────

/// Result code of an upload, mirroring what web servers report per file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Ok,
    NoFile,
    /// Exceeded the server-wide upload limit.
    IniSize,
    /// Exceeded the form's declared limit.
    FormSize,
    Partial,
    NoTmpDir,
    CantWrite,
    Extension,
}

/// Upload descriptor handed over by the transport layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> FileUpload {
        FileUpload {
            name: name.into(),
            size: content.len() as u64,
            status: UploadStatus::Ok,
            content: Some(content),
        }
    }

    /// Placeholder for a file input left blank.
    pub fn empty() -> FileUpload {
        FileUpload {
            status: UploadStatus::NoFile,
            ..FileUpload::default()
        }
    }

    pub fn was_uploaded(&self) -> bool {
        self.status == UploadStatus::Ok && self.content.is_some()
    }
}

pub type FileMap = BTreeMap<String, FileUpload>;
