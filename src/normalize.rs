//! Rule Normalizer: compiles the loosely-typed rule DSL into a canonical
//! [`Rule`] tree.
//!
//! Every schema-authoring mistake surfaces here as a [`SchemaError`], before
//! any data is validated. Normalizing the output of
//! [`crate::serialize::to_value`] yields the same tree again.

use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};

use crate::enums::*;
use crate::error::{SchemaError, SchemaErrorKind};
use crate::path::DataPath;
use crate::primitives::number_from_text;
use crate::provider::{ColumnSpec, NoSchema, SchemaProvider};
use crate::registry::ValidatorRegistry;
use crate::types::*;

/// Normalize `raw` with no database schema and the default validator registry.
pub fn normalize(raw: &Value) -> Result<Rule, SchemaError> {
    let registry = ValidatorRegistry::new();
    Normalizer::new(&NoSchema, &registry).normalize(raw)
}

/// Single-use normalizer with its collaborators injected.
pub struct Normalizer<'a> {
    provider: &'a dyn SchemaProvider,
    registry: &'a ValidatorRegistry,
    /// Rule paths seen so far; `when` may only look backwards.
    declared: HashSet<DataPath>,
}

/// Field-level options that may ride along on any row of a field.
#[derive(Debug, Default)]
struct FieldLevel {
    deprecated: bool,
    replacement: Option<String>,
}

impl<'a> Normalizer<'a> {
    pub fn new(provider: &'a dyn SchemaProvider, registry: &'a ValidatorRegistry) -> Self {
        Normalizer {
            provider,
            registry,
            declared: HashSet::new(),
        }
    }

    /// Normalize a root rule. A root mapping without a `type` key is shorthand
    /// for an object rule whose `fields` are that mapping.
    pub fn normalize(mut self, raw: &Value) -> Result<Rule, SchemaError> {
        let root = DataPath::root();

        let expanded;
        let raw = match raw {
            Value::Object(map) if !map.contains_key("type") => {
                let mut row = Map::new();
                row.insert("type".to_string(), Value::String("object".to_string()));
                row.insert("fields".to_string(), Value::Object(map.clone()));
                expanded = Value::Object(row);
                &expanded
            }
            other => other,
        };

        let (rule, level) = self.normalize_row(raw, &root)?;
        let Some(rule) = rule else {
            return Err(error(
                SchemaErrorKind::MissingType,
                &root,
                "Rule \"type\" is mandatory",
            ));
        };

        if level.deprecated || level.replacement.is_some() {
            return Err(error(
                SchemaErrorKind::Incompatible,
                &root,
                "Root rule cannot be deprecated",
            ));
        }
        if rule.rule_type() != RuleType::Object {
            return Err(error(
                SchemaErrorKind::Incompatible,
                &root,
                "Root rule must be of type \"object\"",
            ));
        }
        if !rule.when.is_empty() {
            return Err(error(
                SchemaErrorKind::Incompatible,
                &root,
                "Root rule cannot be conditional",
            ));
        }

        Ok(rule)
    }

    // ─── Rows ───────────────────────────────────────────────────────────────

    fn normalize_row(
        &mut self,
        raw: &Value,
        path: &DataPath,
    ) -> Result<(Option<Rule>, FieldLevel), SchemaError> {
        self.declared.insert(path.clone());

        let mut draft = Draft::default();

        match raw {
            Value::String(token) => self.apply_token(&mut draft, token, path)?,
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(token) => self.apply_token(&mut draft, token, path)?,
                        Value::Object(options) => {
                            for (key, value) in options {
                                self.apply_option(&mut draft, key, value, path)?;
                            }
                        }
                        _ => {
                            return Err(error(
                                SchemaErrorKind::Syntax,
                                path,
                                "Rule items should be strings or mappings",
                            ));
                        }
                    }
                }
            }
            Value::Object(options) => {
                for (key, value) in options {
                    self.apply_option(&mut draft, key, value, path)?;
                }
            }
            _ => {
                return Err(error(
                    SchemaErrorKind::Syntax,
                    path,
                    "Rule row should be a sequence or a mapping",
                ));
            }
        }

        draft.finish(path)
    }

    fn apply_token(
        &mut self,
        draft: &mut Draft,
        token: &str,
        path: &DataPath,
    ) -> Result<(), SchemaError> {
        match token {
            "required" | "not_empty" | "allow_macro" | "deprecated" => {
                draft.mark(token, path)?;
                draft.set_flag(token, true);
            }
            "boolean" => {
                draft.mark("type", path)?;
                draft.mark_membership(path)?;
                draft.rule_type = Some(RuleType::Integer);
                draft.boolean_token = true;
                draft.membership = Some(Membership::In(vec![
                    InOption::Scalar(Value::from(0)),
                    InOption::Scalar(Value::from(1)),
                ]));
            }
            _ => {
                if let Some(rule_type) = RuleType::from_token(token) {
                    draft.mark("type", path)?;
                    draft.rule_type = Some(rule_type);
                } else if let Some(column) = token.strip_prefix("db ") {
                    draft.mark("type", path)?;
                    let Some((table, field)) = column.trim().split_once('.') else {
                        return Err(error(
                            SchemaErrorKind::InvalidValue,
                            path,
                            format!("Invalid db column reference \"{}\"", column),
                        ));
                    };
                    let spec = self.provider.column(table, field).ok_or_else(|| {
                        error(
                            SchemaErrorKind::UnknownColumn,
                            path,
                            format!("Unknown db column \"{}.{}\"", table, field),
                        )
                    })?;
                    draft.apply_column(spec, path)?;
                } else if let Some(name) = token.strip_prefix("setting ") {
                    draft.mark("type", path)?;
                    let spec = self.provider.setting(name.trim()).ok_or_else(|| {
                        error(
                            SchemaErrorKind::UnknownColumn,
                            path,
                            format!("Unknown setting \"{}\"", name.trim()),
                        )
                    })?;
                    draft.apply_column(spec, path)?;
                } else if let Some(csv) = token.strip_prefix("in ") {
                    draft.mark_membership(path)?;
                    draft.membership = Some(Membership::In(parse_csv(csv, path)?));
                } else if let Some(csv) = token.strip_prefix("not_in ") {
                    draft.mark_membership(path)?;
                    draft.membership = Some(Membership::NotIn(parse_csv(csv, path)?));
                } else {
                    return Err(error(
                        SchemaErrorKind::UnknownRule,
                        path,
                        format!("Unknown rule \"{}\"", token),
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply_option(
        &mut self,
        draft: &mut Draft,
        key: &str,
        value: &Value,
        path: &DataPath,
    ) -> Result<(), SchemaError> {
        match key {
            "type" => {
                draft.mark("type", path)?;
                let rule_type = value
                    .as_str()
                    .and_then(RuleType::from_token)
                    .ok_or_else(|| {
                        error(
                            SchemaErrorKind::InvalidValue,
                            path,
                            format!("Unknown type {}", value),
                        )
                    })?;
                draft.rule_type = Some(rule_type);
            }
            "required" | "not_empty" | "allow_macro" | "deprecated" => {
                draft.mark(key, path)?;
                let flag = value.as_bool().ok_or_else(|| {
                    error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        format!("Rule \"{}\" should contain a boolean", key),
                    )
                })?;
                draft.set_flag(key, flag);
            }
            "in" | "not_in" => {
                draft.mark_membership(path)?;
                let options = parse_keyed_options(key, value, path)?;
                draft.membership = Some(if key == "in" {
                    Membership::In(options)
                } else {
                    Membership::NotIn(options)
                });
            }
            "fields" => {
                draft.mark(key, path)?;
                draft.fields = Some(self.normalize_fields(value, path)?);
            }
            "field" => {
                draft.mark(key, path)?;
                if is_empty_collection(value) {
                    return Err(error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        "Rule \"field\" should contain a non-empty rule",
                    ));
                }
                let (element, level) = self.normalize_row(value, path)?;
                if level.deprecated || level.replacement.is_some() {
                    return Err(error(
                        SchemaErrorKind::Incompatible,
                        path,
                        "Array elements cannot be deprecated",
                    ));
                }
                draft.element = Some(element.ok_or_else(|| {
                    error(
                        SchemaErrorKind::MissingType,
                        path,
                        "Rule \"type\" is mandatory",
                    )
                })?);
            }
            "when" => {
                draft.mark(key, path)?;
                if value.as_str() != Some("else") {
                    draft.when = self.normalize_when(value, path)?;
                }
            }
            "uniq" => {
                draft.mark(key, path)?;
                draft.uniq = Some(normalize_uniq(value, path)?);
            }
            "api_uniq" => {
                draft.mark(key, path)?;
                draft.api_uniq = Some(normalize_api_uniq(value, path)?);
            }
            "min" | "max" => {
                draft.mark(key, path)?;
                let Value::Number(n) = value else {
                    return Err(error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        format!("Rule \"{}\" should contain a number", key),
                    ));
                };
                if key == "min" {
                    draft.min = Some(n.clone());
                } else {
                    draft.max = Some(n.clone());
                }
            }
            "length" => {
                draft.mark(key, path)?;
                let length = value.as_u64().ok_or_else(|| {
                    error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        "Rule \"length\" should contain an integer",
                    )
                })?;
                draft.length = Some(length as usize);
            }
            "regex" => {
                draft.mark(key, path)?;
                let source = value.as_str().ok_or_else(|| {
                    error(
                        SchemaErrorKind::InvalidRegex,
                        path,
                        "Rule \"regex\" should contain a string",
                    )
                })?;
                draft.regex = Some(Pattern::new(source).map_err(|_| {
                    error(
                        SchemaErrorKind::InvalidRegex,
                        path,
                        "Rule \"regex\" contains invalid regex",
                    )
                })?);
            }
            "use" => {
                draft.mark(key, path)?;
                draft.use_rule = Some(self.normalize_use(value, path)?);
            }
            "max-size" => {
                draft.mark(key, path)?;
                let size = match value {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.parse::<u64>().ok(),
                    _ => None,
                };
                draft.max_size = Some(size.ok_or_else(|| {
                    error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        "Rule \"max-size\" should contain a byte count",
                    )
                })?);
            }
            "file-type" => {
                draft.mark(key, path)?;
                draft.file_type = Some(match value.as_str() {
                    Some("file") => FileType::File,
                    Some("image") => FileType::Image,
                    _ => {
                        return Err(error(
                            SchemaErrorKind::InvalidValue,
                            path,
                            "Rule \"file-type\" contains invalid value",
                        ));
                    }
                });
            }
            "messages" => {
                draft.mark(key, path)?;
                draft.messages = normalize_messages(value, path)?;
            }
            "replacement" => {
                draft.mark(key, path)?;
                match value.as_str() {
                    Some(name) if !name.is_empty() => {
                        draft.field_level.replacement = Some(name.to_string());
                    }
                    _ => {
                        return Err(error(
                            SchemaErrorKind::InvalidValue,
                            path,
                            "Rule \"replacement\" should contain a field name",
                        ));
                    }
                }
            }
            "default" => {
                draft.mark(key, path)?;
                if value.is_null() {
                    return Err(error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        "Rule \"default\" cannot be null",
                    ));
                }
                draft.default = Some(value.clone());
            }
            "default_source" => {
                draft.mark(key, path)?;
                let reference = non_empty_str(value).ok_or_else(|| {
                    error(
                        SchemaErrorKind::InvalidValue,
                        path,
                        "Rule \"default_source\" should contain a field reference",
                    )
                })?;
                self.check_declared(reference, path)?;
                draft.default_source = Some(reference.to_string());
            }
            _ => {
                return Err(error(
                    SchemaErrorKind::UnknownRule,
                    path,
                    format!("Unknown rule \"{}\"", key),
                ));
            }
        }
        Ok(())
    }

    // ─── Nested rules ───────────────────────────────────────────────────────

    fn normalize_fields(
        &mut self,
        value: &Value,
        path: &DataPath,
    ) -> Result<Vec<FieldSpec>, SchemaError> {
        let Value::Object(map) = value else {
            return Err(error(
                SchemaErrorKind::InvalidValue,
                path,
                "Rule \"fields\" should contain a mapping",
            ));
        };

        let mut specs = Vec::with_capacity(map.len());

        for (name, field_value) in map {
            if name.is_empty() {
                return Err(error(
                    SchemaErrorKind::InvalidValue,
                    path,
                    "Field name cannot be empty",
                ));
            }
            let field_path = path.field(name);

            let rows: Vec<&Value> = match field_value {
                v if is_empty_collection(v) => Vec::new(),
                Value::Object(_) | Value::String(_) => vec![field_value],
                Value::Array(items) if items.iter().any(Value::is_string) => vec![field_value],
                Value::Array(items) => items.iter().collect(),
                _ => {
                    return Err(error(
                        SchemaErrorKind::Syntax,
                        &field_path,
                        format!("Field \"{}\" should have an array of rule rows", name),
                    ));
                }
            };

            let mut spec = FieldSpec::new(name.as_str());
            self.declared.insert(field_path.clone());

            for row in rows {
                let (rule, level) = self.normalize_row(row, &field_path)?;

                spec.deprecated |= level.deprecated;
                if let Some(replacement) = level.replacement {
                    if spec
                        .replacement
                        .as_ref()
                        .is_some_and(|existing| *existing != replacement)
                    {
                        return Err(error(
                            SchemaErrorKind::DuplicateRule,
                            &field_path,
                            "Rule \"replacement\" is specified multiple times",
                        ));
                    }
                    spec.deprecated = true;
                    spec.replacement = Some(replacement);
                }

                if let Some(rule) = rule {
                    spec.rules.push(rule);
                }
            }

            specs.push(spec);
        }

        for spec in &specs {
            if let Some(replacement) = &spec.replacement
                && (replacement == &spec.name || !map.contains_key(replacement))
            {
                return Err(error(
                    SchemaErrorKind::UnknownReference,
                    &path.field(&spec.name),
                    format!(
                        "Replacement \"{}\" is not a sibling field",
                        replacement
                    ),
                ));
            }
        }

        Ok(specs)
    }

    fn normalize_when(
        &mut self,
        value: &Value,
        path: &DataPath,
    ) -> Result<Vec<WhenRule>, SchemaError> {
        let Value::Array(items) = value else {
            return Err(error(
                SchemaErrorKind::Syntax,
                path,
                "When condition should be an array",
            ));
        };
        if items.is_empty() {
            return Err(error(
                SchemaErrorKind::Syntax,
                path,
                "When condition should be a non-empty array",
            ));
        }

        let conditions: Vec<&Value> = if items[0].is_string() {
            vec![value]
        } else {
            items.iter().collect()
        };

        let mut when = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let pair = match condition {
                Value::Array(pair) if pair.len() == 2 => pair,
                _ => {
                    return Err(error(
                        SchemaErrorKind::Syntax,
                        path,
                        "When condition should be an array of two elements",
                    ));
                }
            };

            let reference = non_empty_str(&pair[0]).ok_or_else(|| {
                error(
                    SchemaErrorKind::Syntax,
                    path,
                    "Missing or invalid comparison field",
                )
            })?;
            self.check_declared(reference, path)?;

            when.push(WhenRule {
                field: reference.to_string(),
                predicate: normalize_predicate(&pair[1], path)?,
            });
        }

        Ok(when)
    }

    fn check_declared(&self, reference: &str, path: &DataPath) -> Result<(), SchemaError> {
        let target = path.resolve_reference(reference);
        if !self.declared.contains(&target) {
            return Err(error(
                SchemaErrorKind::UnknownReference,
                path,
                format!(
                    "Only fields defined prior to this can be referenced (\"{}\" resolves to {})",
                    reference, target
                ),
            ));
        }
        Ok(())
    }

    fn normalize_use(&self, value: &Value, path: &DataPath) -> Result<UseRule, SchemaError> {
        let invalid = || {
            error(
                SchemaErrorKind::InvalidValue,
                path,
                "Rule \"use\" should contain a validator name with optional options and bounds",
            )
        };

        let (name, options, bounds) = match value {
            Value::String(name) => (name.as_str(), &Value::Null, None),
            Value::Array(items) if !items.is_empty() && items.len() <= 3 => (
                items[0].as_str().ok_or_else(invalid)?,
                items.get(1).unwrap_or(&Value::Null),
                items.get(2),
            ),
            _ => return Err(invalid()),
        };

        if !self.registry.contains(name) {
            return Err(error(
                SchemaErrorKind::UnknownValidator,
                path,
                format!("Validator \"{}\" is not registered", name),
            ));
        }

        let options = match options {
            v if is_empty_collection(v) => Value::Null,
            Value::Null | Value::Object(_) => options.clone(),
            _ => return Err(invalid()),
        };

        let (mut min, mut max) = (None, None);
        match bounds {
            None | Some(Value::Null) => {}
            Some(Value::Object(bounds)) => {
                for (key, bound) in bounds {
                    let Value::Number(n) = bound else {
                        return Err(invalid());
                    };
                    match key.as_str() {
                        "min" => min = Some(n.clone()),
                        "max" => max = Some(n.clone()),
                        _ => return Err(invalid()),
                    }
                }
            }
            Some(Value::Array(bounds)) if bounds.is_empty() => {}
            Some(_) => return Err(invalid()),
        }

        Ok(UseRule {
            name: name.to_string(),
            options,
            min,
            max,
        })
    }
}

// ─── Row assembly ───────────────────────────────────────────────────────────

#[derive(Default)]
struct Draft {
    seen: HashSet<String>,
    rule_type: Option<RuleType>,
    boolean_token: bool,
    required: bool,
    not_empty: bool,
    allow_macro: bool,
    membership: Option<Membership>,
    min: Option<Number>,
    max: Option<Number>,
    length: Option<usize>,
    regex: Option<Pattern>,
    use_rule: Option<UseRule>,
    fields: Option<Vec<FieldSpec>>,
    element: Option<Rule>,
    when: Vec<WhenRule>,
    uniq: Option<Vec<Vec<String>>>,
    api_uniq: Option<Vec<ApiUniqCheck>>,
    max_size: Option<u64>,
    file_type: Option<FileType>,
    messages: BTreeMap<String, String>,
    default: Option<Value>,
    default_source: Option<String>,
    field_level: FieldLevel,
}

const FIELD_LEVEL_KEYS: [&str; 2] = ["deprecated", "replacement"];

impl Draft {
    fn mark(&mut self, key: &str, path: &DataPath) -> Result<(), SchemaError> {
        if !self.seen.insert(key.to_string()) {
            return Err(error(
                SchemaErrorKind::DuplicateRule,
                path,
                format!("Rule \"{}\" is specified multiple times", key),
            ));
        }
        Ok(())
    }

    fn mark_membership(&mut self, path: &DataPath) -> Result<(), SchemaError> {
        if self.membership.is_some() {
            return Err(error(
                SchemaErrorKind::DuplicateRule,
                path,
                "Rule \"in\" or \"not_in\" is specified multiple times",
            ));
        }
        Ok(())
    }

    fn set_flag(&mut self, key: &str, flag: bool) {
        match key {
            "required" => self.required = flag,
            "not_empty" => self.not_empty = flag,
            "allow_macro" => self.allow_macro = flag,
            "deprecated" => self.field_level.deprecated = flag,
            _ => {}
        }
    }

    fn apply_column(&mut self, spec: ColumnSpec, path: &DataPath) -> Result<(), SchemaError> {
        self.rule_type = Some(match spec.column_type {
            ColumnType::Id => RuleType::Id,
            ColumnType::Int => RuleType::Integer,
            ColumnType::Float => RuleType::Float,
            ColumnType::Char | ColumnType::Text => {
                if let Some(length) = spec.length {
                    self.mark("length", path)?;
                    self.length = Some(length);
                }
                RuleType::String
            }
            ColumnType::Blob => {
                return Err(error(
                    SchemaErrorKind::UnknownColumn,
                    path,
                    "Unknown field type in db schema",
                ));
            }
        });
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    fn finish(mut self, path: &DataPath) -> Result<(Option<Rule>, FieldLevel), SchemaError> {
        let Some(rule_type) = self.rule_type else {
            if !self.seen.is_empty()
                && self
                    .seen
                    .iter()
                    .all(|key| FIELD_LEVEL_KEYS.contains(&key.as_str()))
            {
                return Ok((None, self.field_level));
            }
            return Err(error(
                SchemaErrorKind::MissingType,
                path,
                "Rule \"type\" is mandatory",
            ));
        };

        let incompatible = |rule: &str| {
            error(
                SchemaErrorKind::Incompatible,
                path,
                format!(
                    "Rule \"{}\" is not compatible with type \"{}\"",
                    rule, rule_type
                ),
            )
        };

        use RuleType as T;

        if self.not_empty && !matches!(rule_type, T::String | T::Objects | T::Array | T::File) {
            return Err(incompatible("not_empty"));
        }
        if self.fields.is_some() && !matches!(rule_type, T::Object | T::Objects) {
            return Err(incompatible("fields"));
        }
        if matches!(rule_type, T::Object | T::Objects)
            && self.fields.is_none()
            && self.when.is_empty()
        {
            return Err(error(
                SchemaErrorKind::Incompatible,
                path,
                "For object/objects in non-conditional rule row \"fields\" rule must be present",
            ));
        }
        if self.element.is_some() && rule_type != T::Array {
            return Err(incompatible("field"));
        }
        if self.api_uniq.is_some() && rule_type != T::Object {
            return Err(incompatible("api_uniq"));
        }
        if self.uniq.is_some() && rule_type != T::Objects {
            return Err(incompatible("uniq"));
        }
        if (self.min.is_some() || self.max.is_some()) && !matches!(rule_type, T::Integer | T::Float)
        {
            return Err(incompatible("min"));
        }
        for (present, rule) in [
            (self.length.is_some(), "length"),
            (self.allow_macro, "allow_macro"),
            (self.regex.is_some(), "regex"),
            (self.use_rule.is_some(), "use"),
        ] {
            if present && rule_type != T::String {
                return Err(incompatible(rule));
            }
        }
        for (present, rule) in [
            (self.max_size.is_some(), "max-size"),
            (self.file_type.is_some(), "file-type"),
        ] {
            if present && rule_type != T::File {
                return Err(incompatible(rule));
            }
        }
        if (self.default.is_some() || self.default_source.is_some()) && rule_type == T::File {
            return Err(incompatible("default"));
        }
        if (self.default.is_some() || self.default_source.is_some()) && self.required {
            return Err(error(
                SchemaErrorKind::Incompatible,
                path,
                "Required fields cannot have a default",
            ));
        }
        if self.default.is_some() && self.default_source.is_some() {
            return Err(error(
                SchemaErrorKind::Incompatible,
                path,
                "Rules \"default\" and \"default_source\" are mutually exclusive",
            ));
        }
        if let (Some(min), Some(max)) = (&self.min, &self.max)
            && min.as_f64() > max.as_f64()
        {
            return Err(error(
                SchemaErrorKind::InvalidValue,
                path,
                "Rule \"min\" is greater than \"max\"",
            ));
        }

        let membership = match self.membership.take() {
            None => None,
            Some(membership) => {
                if !matches!(rule_type, T::Integer | T::Float | T::String) {
                    return Err(incompatible(membership.check_name()));
                }
                Some(canonical_membership(membership, rule_type, path)?)
            }
        };

        if let (Some(uniq), Some(fields)) = (&self.uniq, &self.fields) {
            for key in uniq.iter().flatten() {
                if !fields.iter().any(|field| field.name == *key) {
                    return Err(error(
                        SchemaErrorKind::UnknownReference,
                        path,
                        format!("Rule \"uniq\" refers to unknown field \"{}\"", key),
                    ));
                }
            }
        }

        let checks = self.check_names(rule_type, membership.as_ref());
        if let Some(unknown) = self
            .messages
            .keys()
            .find(|key| !checks.contains(&key.as_str()))
        {
            return Err(error(
                SchemaErrorKind::UnknownRule,
                path,
                format!("Message is defined for non-existing rule \"{}\"", unknown),
            ));
        }

        let membership = if self.boolean_token && self.required {
            self.messages
                .entry("in".to_string())
                .or_insert_with(|| "Must be selected.".to_string());
            Some(Membership::In(vec![InOption::Scalar(Value::from(1))]))
        } else {
            membership
        };

        let kind = match rule_type {
            T::Boolean => RuleKind::Boolean,
            T::Integer => RuleKind::Integer(NumberRule {
                membership,
                min: self.min,
                max: self.max,
            }),
            T::Float => RuleKind::Float(NumberRule {
                membership,
                min: self.min,
                max: self.max,
            }),
            T::String => RuleKind::String(StringRule {
                not_empty: self.not_empty,
                allow_macro: self.allow_macro,
                length: self.length,
                regex: self.regex,
                membership,
                use_rule: self.use_rule,
            }),
            T::Id => RuleKind::Id,
            T::Object => RuleKind::Object(ObjectRule {
                fields: self.fields.unwrap_or_default(),
                api_uniq: self.api_uniq.unwrap_or_default(),
            }),
            T::Objects => RuleKind::Objects(ObjectsRule {
                fields: self.fields.unwrap_or_default(),
                not_empty: self.not_empty,
                uniq: self.uniq.unwrap_or_default(),
            }),
            T::Array => RuleKind::Array(ArrayRule {
                element: self.element.map(Box::new),
                not_empty: self.not_empty,
            }),
            T::File => RuleKind::File(FileRule {
                not_empty: self.not_empty,
                max_size: self.max_size,
                file_type: self.file_type.unwrap_or_default(),
            }),
        };

        let rule = Rule {
            kind,
            required: self.required,
            when: self.when,
            messages: self.messages,
            default: self.default,
            default_source: self.default_source,
        };

        Ok((Some(rule), self.field_level))
    }

    /// Checks whose message a `messages` entry may override.
    fn check_names(&self, rule_type: RuleType, membership: Option<&Membership>) -> Vec<&'static str> {
        let mut checks = vec!["type"];
        if self.required {
            checks.push("required");
        }
        if self.not_empty {
            checks.push("not_empty");
        }
        if let Some(membership) = membership {
            checks.push(membership.check_name());
        }
        if self.boolean_token && self.required {
            checks.push("in");
        }
        for (present, check) in [
            (self.min.is_some(), "min"),
            (self.max.is_some(), "max"),
            (self.length.is_some(), "length"),
            (self.regex.is_some(), "regex"),
            (self.use_rule.is_some(), "use"),
            (self.uniq.is_some(), "uniq"),
            (self.max_size.is_some(), "max-size"),
            (rule_type == RuleType::File && self.has("file-type"), "file-type"),
        ] {
            if present {
                checks.push(check);
            }
        }
        checks
    }
}

// ─── Value sets ─────────────────────────────────────────────────────────────

/// `1,2,5:10,:0` → scalars and `from:to` ranges; an empty side is open.
fn parse_csv(csv: &str, path: &DataPath) -> Result<Vec<InOption>, SchemaError> {
    if csv.trim().is_empty() {
        return Err(invalid_set(path));
    }

    csv.split(',')
        .map(str::trim)
        .map(|token| match token.split_once(':') {
            Some((from, to)) => range_option(bound_text(from, path)?, bound_text(to, path)?, path),
            None => Ok(InOption::Scalar(Value::String(token.to_string()))),
        })
        .collect()
}

fn bound_text(text: &str, path: &DataPath) -> Result<Option<Number>, SchemaError> {
    if text.is_empty() {
        return Ok(None);
    }
    number_from_text(text)
        .map(Some)
        .ok_or_else(|| invalid_set(path))
}

fn range_option(
    from: Option<Number>,
    to: Option<Number>,
    path: &DataPath,
) -> Result<InOption, SchemaError> {
    match (&from, &to) {
        (None, None) => return Err(invalid_set(path)),
        (Some(f), Some(t)) if f.as_f64() >= t.as_f64() => return Err(invalid_set(path)),
        _ => {}
    }
    Ok(InOption::Range { from, to })
}

/// Keyed `in`/`not_in`: a list of scalars and `[from, to]` pairs, or a csv string.
fn parse_keyed_options(
    key: &str,
    value: &Value,
    path: &DataPath,
) -> Result<Vec<InOption>, SchemaError> {
    let items = match value {
        Value::String(csv) => return parse_csv(csv, path),
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(error(
                SchemaErrorKind::InvalidValue,
                path,
                format!("Rule \"{}\" should contain non-empty array", key),
            ));
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(_) | Value::Number(_) => Ok(InOption::Scalar(item.clone())),
            Value::Array(pair) if pair.len() == 2 => {
                range_option(keyed_bound(&pair[0], path)?, keyed_bound(&pair[1], path)?, path)
            }
            _ => Err(invalid_set(path)),
        })
        .collect()
}

fn keyed_bound(value: &Value, path: &DataPath) -> Result<Option<Number>, SchemaError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.clone())),
        Value::String(s) => bound_text(s, path),
        _ => Err(invalid_set(path)),
    }
}

/// Coerce options to the representation the rule type compares with.
fn canonical_membership(
    membership: Membership,
    rule_type: RuleType,
    path: &DataPath,
) -> Result<Membership, SchemaError> {
    let convert = |options: Vec<InOption>| -> Result<Vec<InOption>, SchemaError> {
        options
            .into_iter()
            .map(|option| match (rule_type, option) {
                (RuleType::String, InOption::Range { .. }) => Err(invalid_set(path)),
                (RuleType::String, InOption::Scalar(Value::Number(n))) => {
                    Ok(InOption::Scalar(Value::String(n.to_string())))
                }
                (RuleType::String, scalar) => Ok(scalar),
                (_, InOption::Scalar(Value::String(s))) => number_from_text(s.trim())
                    .map(|n| InOption::Scalar(Value::Number(n)))
                    .ok_or_else(|| invalid_set(path)),
                (_, other) => Ok(other),
            })
            .collect()
    };

    Ok(match membership {
        Membership::In(options) => Membership::In(convert(options)?),
        Membership::NotIn(options) => Membership::NotIn(convert(options)?),
    })
}

fn invalid_set(path: &DataPath) -> SchemaError {
    error(
        SchemaErrorKind::InvalidValue,
        path,
        "Invalid value for rule \"in\" or \"not_in\"",
    )
}

// ─── Small options ──────────────────────────────────────────────────────────

fn normalize_predicate(value: &Value, path: &DataPath) -> Result<WhenPredicate, SchemaError> {
    let unknown = |what: &str| {
        error(
            SchemaErrorKind::UnknownRule,
            path,
            format!("Unknown when rule \"{}\"", what),
        )
    };

    match value {
        Value::Bool(b) => Ok(WhenPredicate::In(vec![InOption::Scalar(Value::from(
            i32::from(*b),
        ))])),
        Value::String(token) => match token.as_str() {
            "exists" | "exist" => Ok(WhenPredicate::Exists),
            "not_exists" | "not_exist" => Ok(WhenPredicate::NotExists),
            "empty" => Ok(WhenPredicate::Empty),
            "not_empty" => Ok(WhenPredicate::NotEmpty),
            other => {
                if let Some(rule_type) = RuleType::from_token(other) {
                    Ok(WhenPredicate::Type(rule_type))
                } else if let Some(csv) = other.strip_prefix("in ") {
                    Ok(WhenPredicate::In(parse_csv(csv, path)?))
                } else if let Some(csv) = other.strip_prefix("not_in ") {
                    Ok(WhenPredicate::NotIn(parse_csv(csv, path)?))
                } else {
                    Err(unknown(other))
                }
            }
        },
        Value::Object(map) if map.len() == 1 => {
            let Some((key, argument)) = map.iter().next() else {
                return Err(unknown(""));
            };
            match key.as_str() {
                "in" => Ok(WhenPredicate::In(parse_keyed_options(key, argument, path)?)),
                "not_in" => Ok(WhenPredicate::NotIn(parse_keyed_options(key, argument, path)?)),
                "regex" => {
                    let source = argument.as_str().ok_or_else(|| {
                        error(
                            SchemaErrorKind::InvalidRegex,
                            path,
                            "Rule \"regex\" should contain a string",
                        )
                    })?;
                    Pattern::new(source).map(WhenPredicate::Regex).map_err(|_| {
                        error(
                            SchemaErrorKind::InvalidRegex,
                            path,
                            "Rule \"regex\" contains invalid regex",
                        )
                    })
                }
                other => Err(unknown(other)),
            }
        }
        other => Err(unknown(&other.to_string())),
    }
}

/// One flat key list, or a list of key lists. Empty entries are dropped.
fn normalize_uniq(value: &Value, path: &DataPath) -> Result<Vec<Vec<String>>, SchemaError> {
    let invalid = || {
        error(
            SchemaErrorKind::InvalidValue,
            path,
            "Rule \"uniq\" should contain a list of field names or a list of such lists",
        )
    };

    let Value::Array(items) = value else {
        return Err(invalid());
    };

    if items.iter().all(Value::is_string) {
        let keys = string_list(items).ok_or_else(invalid)?;
        return Ok(if keys.is_empty() { Vec::new() } else { vec![keys] });
    }

    let mut constraints = Vec::new();
    for item in items {
        let keys = match item {
            Value::String(key) => vec![key.clone()],
            Value::Array(keys) => string_list(keys).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        if !keys.is_empty() {
            constraints.push(keys);
        }
    }
    Ok(constraints)
}

fn string_list(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// `[method, filter?, exclude_id_ref?, params?]` or a list of those.
fn normalize_api_uniq(value: &Value, path: &DataPath) -> Result<Vec<ApiUniqCheck>, SchemaError> {
    let invalid = |message: String| error(SchemaErrorKind::InvalidValue, path, message);

    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(invalid(
                "Rule \"api_uniq\" should contain non-empty array".to_string(),
            ));
        }
    };

    let checks: Vec<&Value> = if items[0].is_string() {
        vec![value]
    } else {
        items.iter().collect()
    };

    let mut result = Vec::with_capacity(checks.len());
    for check in checks {
        let parts = match check {
            Value::Array(parts) if !parts.is_empty() && parts.len() <= 4 => parts,
            _ => {
                return Err(invalid(
                    "Rule \"api_uniq\" should contain a valid API call".to_string(),
                ));
            }
        };

        let method = parts[0].as_str().unwrap_or_default();
        let valid_method = method
            .split_once('.')
            .is_some_and(|(resource, verb)| {
                !resource.is_empty() && !verb.is_empty() && !verb.contains('.')
            });
        if !valid_method {
            return Err(invalid(format!(
                "Rule \"api_uniq\" should contain a valid API call (API call: {})",
                parts[0]
            )));
        }

        let filter = parameter_map(parts.get(1)).ok_or_else(|| {
            invalid("Rule \"api_uniq\" filter should be a mapping".to_string())
        })?;
        let exclude_id = match parts.get(2) {
            None | Some(Value::Null) => None,
            Some(reference) => Some(
                non_empty_str(reference)
                    .ok_or_else(|| {
                        invalid("Rule \"api_uniq\" exclude id should be a field reference".to_string())
                    })?
                    .to_string(),
            ),
        };
        let params = parameter_map(parts.get(3)).ok_or_else(|| {
            invalid("Rule \"api_uniq\" parameters should be a mapping".to_string())
        })?;
        if params.contains_key("filter") {
            return Err(invalid(
                "Rule \"api_uniq\" parameters cannot redefine the filter".to_string(),
            ));
        }

        result.push(ApiUniqCheck {
            method: method.to_string(),
            filter,
            exclude_id,
            params,
        });
    }

    Ok(result)
}

fn parameter_map(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Some(Map::new()),
        Some(Value::Array(items)) if items.is_empty() => Some(Map::new()),
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => None,
    }
}

fn normalize_messages(
    value: &Value,
    path: &DataPath,
) -> Result<BTreeMap<String, String>, SchemaError> {
    let invalid = || {
        error(
            SchemaErrorKind::InvalidValue,
            path,
            "Rule \"messages\" should contain a non-empty mapping of texts",
        )
    };

    match value {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(check, text)| {
                text.as_str()
                    .map(|text| (check.clone(), text.to_string()))
                    .ok_or_else(invalid)
            })
            .collect(),
        _ => Err(invalid()),
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn is_empty_collection(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn error(kind: SchemaErrorKind, path: &DataPath, message: impl Into<String>) -> SchemaError {
    SchemaError::new(kind, path.to_string(), message)
}
