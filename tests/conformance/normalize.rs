use formrules::provider::ColumnSpec;
use formrules::serialize::to_value;
use formrules::*;
use serde_json::{Value, json};

use super::common::schema_error;

fn normalized(rules: Value) -> Rule {
    match normalize(&rules) {
        Ok(rule) => rule,
        Err(e) => panic!("schema should normalize: {}", e),
    }
}

fn root_fields(rule: &Rule) -> &[FieldSpec] {
    match &rule.kind {
        RuleKind::Object(object) => &object.fields,
        other => panic!("root should be an object, got {:?}", other),
    }
}

fn only_row<'a>(rule: &'a Rule, name: &str) -> &'a Rule {
    let field = root_fields(rule)
        .iter()
        .find(|field| field.name == name)
        .unwrap_or_else(|| panic!("field {} missing", name));
    assert_eq!(field.rules.len(), 1, "field {} rows: {:?}", name, field.rules);
    &field.rules[0]
}

// ─── Row syntax ─────────────────────────────────────────────────────────────

#[test]
fn root_mapping_is_object_shorthand() {
    let rule = normalized(json!({"name": ["string"]}));
    assert_eq!(rule.rule_type(), RuleType::Object);
    assert_eq!(root_fields(&rule).len(), 1);
}

#[test]
fn positional_tokens_and_keyed_options_merge_into_one_row() {
    let rule = normalized(json!({
        "name": ["string", "required", "not_empty", {"length": 64, "regex": "^[a-z]+$"}],
    }));
    let row = only_row(&rule, "name");

    assert!(row.required);
    match &row.kind {
        RuleKind::String(string) => {
            assert!(string.not_empty);
            assert_eq!(string.length, Some(64));
            assert_eq!(string.regex.as_ref().map(Pattern::as_str), Some("^[a-z]+$"));
        }
        other => panic!("expected string rule, got {:?}", other),
    }
}

#[test]
fn keyed_row_is_equivalent_to_positional_row() {
    let positional = normalized(json!({"port": ["integer", "required", {"min": 1}]}));
    let keyed = normalized(json!({"port": {"type": "integer", "required": true, "min": 1}}));
    assert_eq!(positional, keyed);
}

#[test]
fn single_token_field_is_one_row() {
    let rule = normalized(json!({"hostid": "id"}));
    assert_eq!(only_row(&rule, "hostid").rule_type(), RuleType::Id);
}

#[test]
fn list_of_rows_keeps_declaration_order() {
    let rule = normalized(json!({
        "type": ["integer"],
        "value": [
            ["integer", {"when": ["type", "in 0"]}],
            ["string", {"when": ["type", "in 1"]}],
            ["float"],
        ],
    }));
    let value = &root_fields(&rule)[1];
    let types: Vec<RuleType> = value.rules.iter().map(Rule::rule_type).collect();
    assert_eq!(types, vec![RuleType::Integer, RuleType::String, RuleType::Float]);
}

#[test]
fn empty_rules_let_the_field_through() {
    let rule = normalized(json!({"extra": [], "more": {}}));
    assert!(root_fields(&rule).iter().all(|field| field.rules.is_empty()));
}

#[test]
fn boolean_token_is_integer_zero_or_one() {
    let rule = normalized(json!({"enabled": ["boolean"]}));
    match &only_row(&rule, "enabled").kind {
        RuleKind::Integer(number) => assert_eq!(
            number.membership,
            Some(Membership::In(vec![
                InOption::Scalar(json!(0)),
                InOption::Scalar(json!(1)),
            ]))
        ),
        other => panic!("expected integer rule, got {:?}", other),
    }
}

#[test]
fn required_boolean_token_must_be_selected() {
    let rule = normalized(json!({"accept": ["boolean", "required"]}));
    let row = only_row(&rule, "accept");
    match &row.kind {
        RuleKind::Integer(number) => assert_eq!(
            number.membership,
            Some(Membership::In(vec![InOption::Scalar(json!(1))]))
        ),
        other => panic!("expected integer rule, got {:?}", other),
    }
    assert_eq!(row.message("in", "default"), "Must be selected.");
}

#[test]
fn keyed_boolean_type_is_strict() {
    let rule = normalized(json!({"flag": {"type": "boolean"}}));
    assert_eq!(only_row(&rule, "flag").kind, RuleKind::Boolean);
}

#[test]
fn csv_membership_is_canonicalized_per_type() {
    let rule = normalized(json!({
        "mode": ["integer", "in 1, 5:10, :-1"],
        "name": ["string", {"in": ["a", 2]}],
    }));

    match &only_row(&rule, "mode").kind {
        RuleKind::Integer(number) => assert_eq!(
            number.membership,
            Some(Membership::In(vec![
                InOption::Scalar(json!(1)),
                InOption::Range {
                    from: Some(5.into()),
                    to: Some(10.into()),
                },
                InOption::Range {
                    from: None,
                    to: Some((-1).into()),
                },
            ]))
        ),
        other => panic!("expected integer rule, got {:?}", other),
    }

    match &only_row(&rule, "name").kind {
        RuleKind::String(string) => assert_eq!(
            string.membership,
            Some(Membership::In(vec![
                InOption::Scalar(json!("a")),
                InOption::Scalar(json!("2")),
            ]))
        ),
        other => panic!("expected string rule, got {:?}", other),
    }
}

#[test]
fn else_condition_is_unconditional() {
    let rule = normalized(json!({
        "a": ["integer"],
        "b": [["string", {"when": ["a", "in 1"]}], ["integer", {"when": "else"}]],
    }));
    let b = &root_fields(&rule)[1];
    assert_eq!(b.rules[0].when.len(), 1);
    assert!(b.rules[1].when.is_empty());
}

#[test]
fn when_accepts_single_condition_and_condition_list() {
    let rule = normalized(json!({
        "a": ["integer"],
        "b": ["string"],
        "c": ["string", {"when": [["a", "exists"], ["b", {"regex": "^x"}]]}],
        "d": ["string", {"when": ["a", true]}],
    }));
    assert_eq!(only_row(&rule, "c").when.len(), 2);
    assert_eq!(
        only_row(&rule, "d").when,
        vec![WhenRule {
            field: "a".to_string(),
            predicate: WhenPredicate::In(vec![InOption::Scalar(json!(1))]),
        }]
    );
}

#[test]
fn deprecated_field_without_rules_keeps_replacement() {
    let rule = normalized(json!({
        "old": {"deprecated": true, "replacement": "new"},
        "new": ["string"],
    }));
    let old = &root_fields(&rule)[0];
    assert!(old.deprecated);
    assert_eq!(old.replacement.as_deref(), Some("new"));
    assert!(old.rules.is_empty());
}

#[test]
fn api_uniq_descriptor_is_parsed() {
    let rule = normalized(json!({
        "type": "object",
        "fields": {
            "hostid": ["id"],
            "host": ["string"],
        },
        "api_uniq": ["host.get", {"host": "{host}"}, "hostid"],
    }));
    match &rule.kind {
        RuleKind::Object(object) => {
            assert_eq!(object.api_uniq.len(), 1);
            let check = &object.api_uniq[0];
            assert_eq!(check.resource(), "host");
            assert_eq!(check.filter.get("host"), Some(&json!("{host}")));
            assert_eq!(check.exclude_id.as_deref(), Some("hostid"));
        }
        other => panic!("expected object rule, got {:?}", other),
    }
}

#[test]
fn db_column_maps_to_rule_type_and_length() {
    let schema = StaticSchema::default()
        .with_column("hosts", "host", ColumnSpec::new(ColumnType::Char, Some(128)))
        .with_column("hosts", "hostid", ColumnSpec::new(ColumnType::Id, None));
    let validator = FormValidator::builder()
        .schema_provider(&schema)
        .build(&json!({
            "hostid": ["db hosts.hostid"],
            "host": ["db hosts.host", "required"],
        }))
        .expect("schema should normalize");

    assert_eq!(only_row(validator.rules(), "hostid").kind, RuleKind::Id);
    match &only_row(validator.rules(), "host").kind {
        RuleKind::String(string) => assert_eq!(string.length, Some(128)),
        other => panic!("expected string rule, got {:?}", other),
    }
}

#[test]
fn static_schema_loads_from_yaml() {
    let schema = StaticSchema::from_yaml(
        "tables:\n  items:\n    delay: { type: char, length: 255 }\nsettings:\n  theme: { type: char, length: 128 }\n",
    )
    .expect("valid schema description");
    let validator = FormValidator::builder()
        .schema_provider(&schema)
        .build(&json!({"delay": ["db items.delay"], "theme": ["setting theme"]}))
        .expect("schema should normalize");
    assert_eq!(only_row(validator.rules(), "theme").rule_type(), RuleType::String);
}

#[test]
fn canonical_output_renormalizes_to_same_tree() {
    let rule = normalized(json!({
        "type": ["integer", "in 0,1", "required"],
        "name": ["string", "not_empty", {"length": 10, "messages": {"length": "Too long."}}],
        "value": [
            ["integer", {"when": ["type", "in 0"], "min": 0, "max": 100}],
            ["string", {"when": ["type", "in 1"], "use": ["time_unit", {"usermacros": true}, {"min": 0, "max": 3600}]}],
        ],
        "tags": ["objects", {"fields": {"tag": ["string", "required"], "value": ["string"]}, "uniq": [["tag", "value"]]}],
        "ids": ["array", {"field": ["id"], "not_empty": true}],
        "accept": ["boolean", "required"],
        "old": ["string", "deprecated", {"replacement": "name"}],
        "file": ["file", {"max-size": 1024, "file-type": "image"}],
        "mode": ["integer", {"default": 3}],
    }));

    let again = normalize(&to_value(&rule)).expect("canonical output should normalize");
    assert_eq!(rule, again);
}

// ─── Schema errors ──────────────────────────────────────────────────────────

#[test]
fn duplicate_type_is_rejected() {
    let error = schema_error(json!({"a": ["string", "integer"]}));
    assert_eq!(error.kind, SchemaErrorKind::DuplicateRule);
    assert_eq!(error.path, "/a");
}

#[test]
fn token_and_keyed_option_conflict_is_rejected() {
    let error = schema_error(json!({"a": ["string", "required", {"required": true}]}));
    assert_eq!(error.kind, SchemaErrorKind::DuplicateRule);
}

#[test]
fn row_without_type_is_rejected() {
    let error = schema_error(json!({"a": ["required"]}));
    assert_eq!(error.kind, SchemaErrorKind::MissingType);
}

#[test]
fn unknown_token_is_rejected() {
    let error = schema_error(json!({"a": ["string", "shiny"]}));
    assert_eq!(error.kind, SchemaErrorKind::UnknownRule);
}

#[test]
fn incompatible_rules_are_rejected() {
    for rules in [
        json!({"a": ["integer", "not_empty"]}),
        json!({"a": ["string", {"min": 1}]}),
        json!({"a": ["integer", {"length": 5}]}),
        json!({"a": ["id", {"fields": {}}]}),
        json!({"a": ["object"]}),
        json!({"a": ["string", "required", {"default": "x"}]}),
        json!({"a": ["file", {"default": "x"}]}),
        json!({"a": ["integer", {"default": 1, "default_source": "a"}]}),
    ] {
        let error = schema_error(rules.clone());
        assert_eq!(error.kind, SchemaErrorKind::Incompatible, "rules: {}", rules);
    }
}

#[test]
fn string_ranges_are_rejected() {
    let error = schema_error(json!({"a": ["string", "in 1:5"]}));
    assert_eq!(error.kind, SchemaErrorKind::InvalidValue);
}

#[test]
fn malformed_ranges_are_rejected() {
    for csv in ["in :", "in 5:1", "in a:b", "in "] {
        let error = schema_error(json!({"a": ["integer", csv]}));
        assert_eq!(error.kind, SchemaErrorKind::InvalidValue, "csv: {}", csv);
    }
}

#[test]
fn min_above_max_is_rejected() {
    let error = schema_error(json!({"a": ["integer", {"min": 10, "max": 1}]}));
    assert_eq!(error.kind, SchemaErrorKind::InvalidValue);
}

#[test]
fn invalid_regex_is_rejected() {
    let error = schema_error(json!({"a": ["string", {"regex": "(unclosed"}]}));
    assert_eq!(error.kind, SchemaErrorKind::InvalidRegex);
}

#[test]
fn unregistered_validator_is_rejected() {
    let error = schema_error(json!({"a": ["string", {"use": "no_such_validator"}]}));
    assert_eq!(error.kind, SchemaErrorKind::UnknownValidator);

    let registry = ValidatorRegistry::empty();
    let result = FormValidator::builder()
        .registry(registry)
        .build(&json!({"a": ["string", {"use": "regex"}]}));
    assert_eq!(
        result.map(|_| ()).map_err(|e| e.kind),
        Err(SchemaErrorKind::UnknownValidator)
    );
}

#[test]
fn forward_reference_is_rejected() {
    let error = schema_error(json!({
        "a": ["string", {"when": ["b", "exists"]}],
        "b": ["string"],
    }));
    assert_eq!(error.kind, SchemaErrorKind::UnknownReference);
    assert_eq!(error.path, "/a");
}

#[test]
fn parent_reference_from_nested_object_is_accepted() {
    normalized(json!({
        "type": ["integer"],
        "items": ["objects", {"fields": {
            "name": ["string", {"when": ["../type", "in 1"]}],
        }}],
    }));
}

#[test]
fn default_source_must_reference_earlier_field() {
    let error = schema_error(json!({
        "a": ["string", {"default_source": "b"}],
        "b": ["string"],
    }));
    assert_eq!(error.kind, SchemaErrorKind::UnknownReference);
}

#[test]
fn replacement_must_be_a_sibling() {
    let error = schema_error(json!({"old": {"deprecated": true, "replacement": "missing"}}));
    assert_eq!(error.kind, SchemaErrorKind::UnknownReference);

    let error = schema_error(json!({"old": {"deprecated": true, "replacement": "old"}}));
    assert_eq!(error.kind, SchemaErrorKind::UnknownReference);
}

#[test]
fn message_for_missing_check_is_rejected() {
    let error = schema_error(json!({"a": ["string", {"messages": {"length": "Too long."}}]}));
    assert_eq!(error.kind, SchemaErrorKind::UnknownRule);
}

#[test]
fn uniq_must_name_declared_fields() {
    let error = schema_error(json!({
        "items": ["objects", {"fields": {"name": ["string"]}, "uniq": ["name", "other"]}],
    }));
    assert_eq!(error.kind, SchemaErrorKind::UnknownReference);
}

#[test]
fn api_uniq_method_needs_resource_and_verb() {
    let error = schema_error(json!({
        "type": "object",
        "fields": {"host": ["string"]},
        "api_uniq": ["hostget", {"host": "{host}"}],
    }));
    assert_eq!(error.kind, SchemaErrorKind::InvalidValue);

    let error = schema_error(json!({
        "type": "object",
        "fields": {"host": ["string"]},
        "api_uniq": ["host.get", {}, null, {"filter": {}}],
    }));
    assert_eq!(error.kind, SchemaErrorKind::InvalidValue);
}

#[test]
fn root_must_be_unconditional_non_deprecated_object() {
    assert_eq!(
        schema_error(json!({"type": "string"})).kind,
        SchemaErrorKind::Incompatible
    );
    assert_eq!(
        schema_error(json!({"type": "object", "fields": {}, "deprecated": true})).kind,
        SchemaErrorKind::Incompatible
    );
}

#[test]
fn unknown_db_column_is_rejected() {
    let error = schema_error(json!({"a": ["db hosts.host"]}));
    assert_eq!(error.kind, SchemaErrorKind::UnknownColumn);

    let schema = StaticSchema::default().with_column(
        "images",
        "data",
        ColumnSpec::new(ColumnType::Blob, None),
    );
    let result = FormValidator::builder()
        .schema_provider(&schema)
        .build(&json!({"a": ["db images.data"]}));
    assert_eq!(
        result.map(|_| ()).map_err(|e| e.kind),
        Err(SchemaErrorKind::UnknownColumn)
    );
}
