//! Canonical [`Rule`] → rule DSL serialization.
//!
//! Output uses the keyed form only, so feeding it back through
//! [`crate::normalize::normalize`] reproduces the same tree.

use serde_json::{Map, Value};

use crate::error::{SchemaError, SchemaErrorKind};
use crate::types::*;

/// Serialize a rule tree to a YAML string.
pub fn to_yaml(rule: &Rule) -> Result<String, SchemaError> {
    serde_saphyr::to_string(&to_value(rule)).map_err(|e| {
        SchemaError::new(
            SchemaErrorKind::Syntax,
            "",
            format!("failed to serialize rules to YAML: {}", e),
        )
    })
}

/// Serialize a rule row to its keyed DSL mapping.
pub fn to_value(rule: &Rule) -> Value {
    let mut row = Map::new();
    row.insert("type".to_string(), rule.rule_type().as_str().into());

    if rule.required {
        row.insert("required".to_string(), Value::Bool(true));
    }

    match &rule.kind {
        RuleKind::Boolean | RuleKind::Id => {}
        RuleKind::Integer(number) | RuleKind::Float(number) => {
            insert_membership(&mut row, number.membership.as_ref());
            if let Some(min) = &number.min {
                row.insert("min".to_string(), Value::Number(min.clone()));
            }
            if let Some(max) = &number.max {
                row.insert("max".to_string(), Value::Number(max.clone()));
            }
        }
        RuleKind::String(string) => {
            if string.not_empty {
                row.insert("not_empty".to_string(), Value::Bool(true));
            }
            if string.allow_macro {
                row.insert("allow_macro".to_string(), Value::Bool(true));
            }
            if let Some(length) = string.length {
                row.insert("length".to_string(), Value::from(length));
            }
            if let Some(regex) = &string.regex {
                row.insert("regex".to_string(), regex.as_str().into());
            }
            insert_membership(&mut row, string.membership.as_ref());
            if let Some(use_rule) = &string.use_rule {
                row.insert("use".to_string(), use_value(use_rule));
            }
        }
        RuleKind::Object(object) => {
            row.insert("fields".to_string(), fields_value(&object.fields));
            if !object.api_uniq.is_empty() {
                let checks = object.api_uniq.iter().map(api_uniq_value).collect();
                row.insert("api_uniq".to_string(), Value::Array(checks));
            }
        }
        RuleKind::Objects(objects) => {
            if objects.not_empty {
                row.insert("not_empty".to_string(), Value::Bool(true));
            }
            row.insert("fields".to_string(), fields_value(&objects.fields));
            if !objects.uniq.is_empty() {
                let uniq = objects
                    .uniq
                    .iter()
                    .map(|keys| Value::Array(keys.iter().map(|k| k.as_str().into()).collect()))
                    .collect();
                row.insert("uniq".to_string(), Value::Array(uniq));
            }
        }
        RuleKind::Array(array) => {
            if array.not_empty {
                row.insert("not_empty".to_string(), Value::Bool(true));
            }
            if let Some(element) = &array.element {
                row.insert("field".to_string(), to_value(element));
            }
        }
        RuleKind::File(file) => {
            if file.not_empty {
                row.insert("not_empty".to_string(), Value::Bool(true));
            }
            if let Some(max_size) = file.max_size {
                row.insert("max-size".to_string(), Value::from(max_size));
            }
            row.insert("file-type".to_string(), file.file_type.as_str().into());
        }
    }

    if !rule.when.is_empty() {
        let when = rule.when.iter().map(when_value).collect();
        row.insert("when".to_string(), Value::Array(when));
    }
    if !rule.messages.is_empty() {
        let messages = rule
            .messages
            .iter()
            .map(|(check, text)| (check.clone(), Value::String(text.clone())))
            .collect();
        row.insert("messages".to_string(), Value::Object(messages));
    }
    if let Some(default) = &rule.default {
        row.insert("default".to_string(), default.clone());
    }
    if let Some(source) = &rule.default_source {
        row.insert("default_source".to_string(), source.as_str().into());
    }

    Value::Object(row)
}

fn fields_value(fields: &[FieldSpec]) -> Value {
    let mut map = Map::new();
    for field in fields {
        let mut rows: Vec<Value> = field.rules.iter().map(to_value).collect();

        if field.deprecated || field.replacement.is_some() {
            if rows.is_empty() {
                rows.push(Value::Object(Map::new()));
            }
            if let Some(Value::Object(first)) = rows.first_mut() {
                first.insert("deprecated".to_string(), Value::Bool(true));
                if let Some(replacement) = &field.replacement {
                    first.insert("replacement".to_string(), replacement.as_str().into());
                }
            }
        }

        map.insert(field.name.clone(), Value::Array(rows));
    }
    Value::Object(map)
}

fn insert_membership(row: &mut Map<String, Value>, membership: Option<&Membership>) {
    if let Some(membership) = membership {
        row.insert(
            membership.check_name().to_string(),
            options_value(membership.options()),
        );
    }
}

fn options_value(options: &[InOption]) -> Value {
    Value::Array(
        options
            .iter()
            .map(|option| match option {
                InOption::Scalar(value) => value.clone(),
                InOption::Range { from, to } => Value::Array(vec![
                    from.clone().map_or(Value::Null, Value::Number),
                    to.clone().map_or(Value::Null, Value::Number),
                ]),
            })
            .collect(),
    )
}

fn use_value(use_rule: &UseRule) -> Value {
    if use_rule.options.is_null() && use_rule.min.is_none() && use_rule.max.is_none() {
        return use_rule.name.as_str().into();
    }

    let mut bounds = Map::new();
    if let Some(min) = &use_rule.min {
        bounds.insert("min".to_string(), Value::Number(min.clone()));
    }
    if let Some(max) = &use_rule.max {
        bounds.insert("max".to_string(), Value::Number(max.clone()));
    }

    Value::Array(vec![
        use_rule.name.as_str().into(),
        use_rule.options.clone(),
        Value::Object(bounds),
    ])
}

fn api_uniq_value(check: &ApiUniqCheck) -> Value {
    Value::Array(vec![
        check.method.as_str().into(),
        Value::Object(check.filter.clone()),
        check
            .exclude_id
            .as_deref()
            .map_or(Value::Null, Value::from),
        Value::Object(check.params.clone()),
    ])
}

fn when_value(when: &WhenRule) -> Value {
    let predicate = match &when.predicate {
        WhenPredicate::Exists => "exists".into(),
        WhenPredicate::NotExists => "not_exists".into(),
        WhenPredicate::Empty => "empty".into(),
        WhenPredicate::NotEmpty => "not_empty".into(),
        WhenPredicate::Type(rule_type) => rule_type.as_str().into(),
        WhenPredicate::In(options) => keyed("in", options_value(options)),
        WhenPredicate::NotIn(options) => keyed("not_in", options_value(options)),
        WhenPredicate::Regex(pattern) => keyed("regex", pattern.as_str().into()),
    };
    Value::Array(vec![when.field.as_str().into(), predicate])
}

fn keyed(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}
