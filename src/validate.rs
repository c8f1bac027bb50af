//! Recursive Validator.
//!
//! Walks the canonical rule tree and the submitted data together. Field
//! errors go straight to the [`ErrorSink`]; the walk rebuilds the output
//! from validated values only, in rule declaration order, so unknown fields
//! and fields whose `when` conditions do not hold are dropped.

use serde_json::{Map, Value};
use tracing::warn;

use crate::enums::*;
use crate::path::DataPath;
use crate::primitives::*;
use crate::registry::{ValidatorRegistry, finish_message};
use crate::report::ErrorSink;
use crate::resolve::{FieldValueCache, collection_entries, test_when};
use crate::types::*;
use crate::uniq::{LocalUniqCheck, RemoteUniqCheck};

/// A failed check of one value.
struct Failure {
    /// Overrides the path of the value being checked.
    path: Option<DataPath>,
    message: String,
    level: ErrorLevel,
}

impl Failure {
    fn primary(message: impl Into<String>) -> Failure {
        Failure {
            path: None,
            message: message.into(),
            level: ErrorLevel::Primary,
        }
    }

    fn delayed(message: impl Into<String>) -> Failure {
        Failure {
            path: None,
            message: message.into(),
            level: ErrorLevel::Delayed,
        }
    }

    fn at(path: DataPath, message: impl Into<String>) -> Failure {
        Failure {
            path: Some(path),
            message: message.into(),
            level: ErrorLevel::Primary,
        }
    }
}

/// State of one structural pass.
pub(crate) struct Validator<'a> {
    registry: &'a ValidatorRegistry,
    cache: &'a FieldValueCache,
    max_id: u64,
    pub(crate) sink: ErrorSink,
    pub(crate) local_checks: Vec<LocalUniqCheck<'a>>,
    pub(crate) remote_checks: Vec<RemoteUniqCheck<'a>>,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(
        registry: &'a ValidatorRegistry,
        cache: &'a FieldValueCache,
        max_id: u64,
        sink: ErrorSink,
    ) -> Validator<'a> {
        Validator {
            registry,
            cache,
            max_id,
            sink,
            local_checks: Vec::new(),
            remote_checks: Vec::new(),
        }
    }

    /// Validate the whole submission. Uploaded files are only looked up for
    /// fields of the root object.
    pub(crate) fn validate_root(
        &mut self,
        root: &'a Rule,
        data: &Value,
        files: &FileMap,
    ) -> (Value, FileMap) {
        let root_path = DataPath::root();

        let (RuleKind::Object(object), Value::Object(input)) = (&root.kind, data) else {
            self.sink.add(
                &root_path,
                root.message("type", "An object is expected."),
                ErrorLevel::Primary,
            );
            return (Value::Object(Map::new()), FileMap::new());
        };

        let (output, files) =
            self.validate_fields(&object.fields, &object.api_uniq, input, &root_path, Some(files));
        (Value::Object(output), files)
    }

    // ─── Objects ────────────────────────────────────────────────────────────

    fn validate_fields(
        &mut self,
        fields: &'a [FieldSpec],
        api_uniq: &'a [ApiUniqCheck],
        input: &Map<String, Value>,
        path: &DataPath,
        files: Option<&FileMap>,
    ) -> (Map<String, Value>, FileMap) {
        let mut output = Map::new();
        let mut output_files = FileMap::new();

        for field in fields {
            if self.sink.has_fatal() {
                break;
            }
            let field_path = path.field(&field.name);

            if field.rules.is_empty() {
                if let Some(value) = input.get(&field.name) {
                    output.insert(field.name.clone(), value.clone());
                }
                if let Some(upload) = files.and_then(|files| files.get(&field.name)) {
                    output_files.insert(field.name.clone(), upload.clone());
                }
                continue;
            }

            let Some(row) = self.choose_row(&field.rules, &field_path) else {
                continue;
            };

            if let RuleKind::File(file_rule) = &row.kind {
                match files.and_then(|files| files.get(&field.name)) {
                    Some(upload) => match validate_file(row, file_rule, upload) {
                        Ok(()) => {
                            output_files.insert(field.name.clone(), upload.clone());
                        }
                        Err(message) => {
                            self.sink.add(&field_path, message, ErrorLevel::Primary);
                        }
                    },
                    None => self.absent(row, &field.name, &field_path, &mut output),
                }
                continue;
            }

            match input.get(&field.name).filter(|value| !value.is_null()) {
                Some(value) => match self.validate_value(row, value, &field_path) {
                    Ok(value) => {
                        output.insert(field.name.clone(), value);
                    }
                    Err(failure) => self.report(&field_path, failure),
                },
                None => self.absent(row, &field.name, &field_path, &mut output),
            }
        }

        for check in api_uniq {
            self.remote_checks.push(RemoteUniqCheck {
                check,
                path: path.clone(),
            });
        }

        (output, output_files)
    }

    fn absent(
        &mut self,
        row: &Rule,
        name: &str,
        field_path: &DataPath,
        output: &mut Map<String, Value>,
    ) {
        if row.required {
            self.sink.add(
                field_path,
                row.message("required", "Required field is missing."),
                ErrorLevel::Primary,
            );
        } else if let Some(default) = &row.default {
            output.insert(name.to_string(), default.clone());
        } else if let Some(source) = &row.default_source {
            let target = field_path.resolve_reference(source);
            match self.cache.get(&target) {
                Some(record) => {
                    if let Some(value) = record.scalar().and_then(|v| self.coerce_default(row, v)) {
                        output.insert(name.to_string(), value);
                    }
                }
                None => self.unresolved(field_path, &target),
            }
        }
    }

    /// A copied source value in the representation of `row`'s type, if it has one.
    fn coerce_default(&self, row: &Rule, value: &Value) -> Option<Value> {
        match &row.kind {
            RuleKind::Boolean => value.as_bool().map(Value::Bool),
            RuleKind::Integer(_) => parse_int32(value).map(Value::from),
            RuleKind::Float(_) => parse_float(value).map(|f| float_to_value(value, f)),
            RuleKind::String(_) => scalar_text(value).map(Value::String),
            RuleKind::Id => parse_id(value, self.max_id).map(Value::String),
            _ => None,
        }
    }

    /// First row whose `when` conditions all hold, evaluated from `context`.
    fn choose_row(&mut self, rows: &'a [Rule], context: &DataPath) -> Option<&'a Rule> {
        for row in rows {
            match self.conditions_hold(&row.when, context) {
                Some(true) => return Some(row),
                Some(false) => {}
                None => return None,
            }
        }
        None
    }

    /// `None` after a fatal cache miss.
    fn conditions_hold(&mut self, when: &[WhenRule], context: &DataPath) -> Option<bool> {
        for condition in when {
            let target = context.resolve_reference(&condition.field);
            let Some(record) = self.cache.get(&target) else {
                self.unresolved(context, &target);
                return None;
            };
            if !test_when(&condition.predicate, record) {
                return Some(false);
            }
        }
        Some(true)
    }

    fn unresolved(&mut self, path: &DataPath, target: &DataPath) {
        self.sink.add_fatal(
            path,
            format!("Internal error: field reference {} was not resolved.", target),
        );
    }

    fn report(&mut self, path: &DataPath, failure: Failure) {
        let path = failure.path.unwrap_or_else(|| path.clone());
        self.sink.add(&path, failure.message, failure.level);
    }

    // ─── Dispatch ───────────────────────────────────────────────────────────

    fn validate_value(
        &mut self,
        row: &'a Rule,
        value: &Value,
        path: &DataPath,
    ) -> Result<Value, Failure> {
        match &row.kind {
            RuleKind::Boolean => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| Failure::primary(row.message("type", "This value is not a valid boolean."))),
            RuleKind::Integer(rule) => {
                let n = parse_int32(value).ok_or_else(|| {
                    Failure::primary(row.message("type", "This value is not a valid integer."))
                })?;
                check_number(row, rule, n as f64)?;
                Ok(Value::from(n))
            }
            RuleKind::Float(rule) => {
                let f = parse_float(value).ok_or_else(|| {
                    Failure::primary(row.message(
                        "type",
                        "This value is not a valid floating-point value.",
                    ))
                })?;
                check_number(row, rule, f)?;
                Ok(float_to_value(value, f))
            }
            RuleKind::String(rule) => self.validate_string(row, rule, value),
            RuleKind::Id => parse_id(value, self.max_id).map(Value::String).ok_or_else(|| {
                Failure::primary(row.message("type", "This value is not a valid identifier."))
            }),
            RuleKind::Object(object) => {
                let Value::Object(input) = value else {
                    return Err(Failure::primary(row.message("type", "An object is expected.")));
                };
                let (output, _) =
                    self.validate_fields(&object.fields, &object.api_uniq, input, path, None);
                Ok(Value::Object(output))
            }
            RuleKind::Objects(objects) => self.validate_objects(row, objects, value, path),
            RuleKind::Array(array) => self.validate_array(row, array, value, path),
            RuleKind::File(_) => Err(Failure::primary(row.message("type", "A file is expected."))),
        }
    }

    fn validate_string(
        &self,
        row: &Rule,
        rule: &StringRule,
        value: &Value,
    ) -> Result<Value, Failure> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(Failure::primary(
                    row.message("type", "This value is not a valid string."),
                ));
            }
        };

        if rule.not_empty && text.is_empty() {
            return Err(Failure::primary(
                row.message("not_empty", "This field cannot be empty."),
            ));
        }

        if rule.allow_macro && !text.is_empty() && parse_user_macro(&text).is_some() {
            return Ok(Value::String(text));
        }

        if let Some(length) = rule.length
            && text.chars().count() > length
        {
            return Err(Failure::primary(row.message("length", "This value is too long.")));
        }

        if let Some(regex) = &rule.regex
            && !regex.is_match(&text)
        {
            return Err(Failure::primary(
                row.message("regex", "This value does not match pattern."),
            ));
        }

        if let Some(membership) = &rule.membership {
            let hit = string_matches_any(&text, membership.options());
            let allowed = match membership {
                Membership::In(_) => hit,
                Membership::NotIn(_) => !hit,
            };
            if !allowed {
                return Err(Failure::primary(row.message(
                    membership.check_name(),
                    string_membership_message(membership),
                )));
            }
        }

        if let Some(use_rule) = &rule.use_rule
            && !text.is_empty()
        {
            let outcome = match self.registry.get(&use_rule.name) {
                Some(validator) => validator.validate(&text, use_rule),
                None => Err(format!("unknown validator \"{}\"", use_rule.name)),
            };
            if let Err(message) = outcome {
                return Err(Failure::delayed(
                    row.message("use", finish_message(&message)),
                ));
            }
        }

        Ok(Value::String(text))
    }

    // ─── Collections ────────────────────────────────────────────────────────

    fn validate_objects(
        &mut self,
        row: &'a Rule,
        objects: &'a ObjectsRule,
        value: &Value,
        path: &DataPath,
    ) -> Result<Value, Failure> {
        if !(value.is_array() || value.is_object()) {
            return Err(Failure::primary(row.message("type", "An array is expected.")));
        }
        let entries = collection_entries(value);

        if objects.not_empty && entries.is_empty() {
            return Err(Failure::primary(
                row.message("not_empty", "This field cannot be empty."),
            ));
        }

        let mut elements = Vec::with_capacity(entries.len());
        for (key, element) in entries {
            let element_path = path.key(&key);
            let Value::Object(input) = element else {
                return Err(Failure::at(element_path, "An object is expected."));
            };
            let (output, _) = self.validate_fields(&objects.fields, &[], input, &element_path, None);
            elements.push((key, Value::Object(output)));

            if self.sink.has_fatal() {
                break;
            }
        }

        if !objects.uniq.is_empty() {
            self.local_checks.push(LocalUniqCheck {
                row,
                rule: objects,
                path: path.clone(),
                elements: elements.clone(),
            });
        }

        Ok(rebuild(value, elements))
    }

    fn validate_array(
        &mut self,
        row: &'a Rule,
        array: &'a ArrayRule,
        value: &Value,
        path: &DataPath,
    ) -> Result<Value, Failure> {
        if !(value.is_array() || value.is_object()) {
            return Err(Failure::primary(row.message("type", "An array is expected.")));
        }
        let entries: Vec<(String, &Value)> = collection_entries(value)
            .into_iter()
            .filter(|(_, item)| !item.is_null())
            .collect();

        if array.not_empty && entries.is_empty() {
            return Err(Failure::primary(
                row.message("not_empty", "This field cannot be empty."),
            ));
        }

        let element = match array.element.as_deref() {
            Some(element) => element,
            None => {
                let items = entries.into_iter().map(|(k, v)| (k, v.clone())).collect();
                return Ok(rebuild(value, items));
            }
        };

        // Element conditions are evaluated from the array field itself.
        match self.conditions_hold(&element.when, path) {
            Some(true) => {}
            Some(false) => {
                let items = entries.into_iter().map(|(k, v)| (k, v.clone())).collect();
                return Ok(rebuild(value, items));
            }
            None => return Ok(Value::Null),
        }

        let mut items = Vec::with_capacity(entries.len());
        for (key, item) in entries {
            let item_path = path.key(&key);
            match self.validate_value(element, item, &item_path) {
                Ok(item) => items.push((key, item)),
                Err(failure) => self.report(&item_path, failure),
            }
        }

        Ok(rebuild(value, items))
    }
}

/// Collection of the same shape as `original` holding `items`.
fn rebuild(original: &Value, items: Vec<(String, Value)>) -> Value {
    match original {
        Value::Object(_) => Value::Object(items.into_iter().collect()),
        _ => Value::Array(items.into_iter().map(|(_, item)| item).collect()),
    }
}

// ─── Deprecated parameters ──────────────────────────────────────────────────

/// Moves deprecated values to their replacement keys throughout `data`.
///
/// Runs before dependency resolution so that the resolver and the structural
/// pass see the same instance. A deprecated value whose replacement is also
/// submitted stays in place and is reported.
pub(crate) fn migrate_deprecated(root: &Rule, data: &Value, sink: &mut ErrorSink) -> Value {
    let mut data = data.clone();
    migrate_rule(root, &mut data, &DataPath::root(), sink);
    data
}

fn migrate_rule(rule: &Rule, value: &mut Value, path: &DataPath, sink: &mut ErrorSink) {
    match &rule.kind {
        RuleKind::Object(object) => {
            if let Value::Object(map) = value {
                migrate_fields(&object.fields, map, path, sink);
            }
        }
        RuleKind::Objects(objects) => {
            for_each_entry(value, path, |element, element_path| {
                if let Value::Object(map) = element {
                    migrate_fields(&objects.fields, map, element_path, sink);
                }
            });
        }
        RuleKind::Array(array) => {
            if let Some(element) = array.element.as_deref() {
                for_each_entry(value, path, |item, item_path| {
                    migrate_rule(element, item, item_path, sink);
                });
            }
        }
        _ => {}
    }
}

fn migrate_fields(fields: &[FieldSpec], map: &mut Map<String, Value>, path: &DataPath, sink: &mut ErrorSink) {
    for field in fields.iter().filter(|field| field.deprecated) {
        if map.get(&field.name).is_none_or(Value::is_null) {
            continue;
        }
        let field_path = path.field(&field.name);
        warn!(path = %field_path, replacement = ?field.replacement, "deprecated parameter used");

        let Some(replacement) = &field.replacement else {
            continue;
        };
        if map.get(replacement).is_some_and(|value| !value.is_null()) {
            sink.add(
                &field_path,
                "Cannot use deprecated parameter with its replacement.",
                ErrorLevel::Primary,
            );
        } else if let Some(value) = map.remove(&field.name) {
            map.insert(replacement.clone(), value);
        }
    }

    for field in fields {
        let Some(value) = map.get_mut(&field.name) else {
            continue;
        };
        let field_path = path.field(&field.name);
        for row in &field.rules {
            migrate_rule(row, value, &field_path, sink);
        }
    }
}

fn for_each_entry(value: &mut Value, path: &DataPath, mut f: impl FnMut(&mut Value, &DataPath)) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                f(item, &path.index(index));
            }
        }
        Value::Object(entries) => {
            for (key, item) in entries.iter_mut() {
                f(item, &path.key(key));
            }
        }
        _ => {}
    }
}

// ─── Scalars ────────────────────────────────────────────────────────────────

fn check_number(row: &Rule, rule: &NumberRule, value: f64) -> Result<(), Failure> {
    if let Some(membership) = &rule.membership {
        let hit = number_matches_any(value, membership.options());
        let allowed = match membership {
            Membership::In(_) => hit,
            Membership::NotIn(_) => !hit,
        };
        if !allowed {
            return Err(Failure::primary(row.message(
                membership.check_name(),
                numeric_membership_message(membership),
            )));
        }
    }

    if let Some(min) = &rule.min
        && min.as_f64().is_some_and(|min| value < min)
    {
        return Err(Failure::primary(row.message(
            "min",
            format!("This value must be no less than \"{}\".", min),
        )));
    }

    if let Some(max) = &rule.max
        && max.as_f64().is_some_and(|max| value > max)
    {
        return Err(Failure::primary(row.message(
            "max",
            format!("This value must be no greater than \"{}\".", max),
        )));
    }

    Ok(())
}

fn validate_file(row: &Rule, rule: &FileRule, upload: &FileUpload) -> Result<(), String> {
    let too_big = || match rule.max_size {
        Some(max) => format!("File is too big, max upload size is {}.", human_size(max)),
        None => "File is too big.".to_string(),
    };

    match upload.status {
        UploadStatus::Ok | UploadStatus::NoFile => {}
        UploadStatus::IniSize | UploadStatus::FormSize => {
            return Err(row.message("max-size", too_big()));
        }
        UploadStatus::Partial => return Err("The file was only partially uploaded.".to_string()),
        UploadStatus::NoTmpDir => return Err("Missing a temporary folder.".to_string()),
        UploadStatus::CantWrite => return Err("Failed to write file to disk.".to_string()),
        UploadStatus::Extension => return Err("File upload stopped by extension.".to_string()),
    }

    if !(upload.was_uploaded() || rule.not_empty) {
        return Ok(());
    }

    let content = match &upload.content {
        Some(content) if upload.was_uploaded() && !(rule.not_empty && content.is_empty()) => content,
        _ => return Err(row.message("not_empty", "This field cannot be empty.")),
    };

    if let Some(max) = rule.max_size
        && upload.size.max(content.len() as u64) > max
    {
        return Err(row.message("max-size", too_big()));
    }

    if rule.file_type == FileType::Image && !looks_like_image(content) {
        return Err(row.message("file-type", "File format is unsupported."));
    }

    Ok(())
}
