use formrules::serialize::{to_value, to_yaml};
use formrules::*;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

/// Strategy for one scalar rule row written in the shorthand syntax.
fn arb_scalar_row() -> impl Strategy<Value = Value> {
    let integer = (any::<bool>(), prop::option::of((-50i64..50, 0i64..50))).prop_map(
        |(required, bounds)| {
            let mut row = vec![json!("integer")];
            if required {
                row.push(json!("required"));
            }
            if let Some((min, span)) = bounds {
                row.push(json!({"min": min, "max": min + span}));
            }
            Value::Array(row)
        },
    );

    let string = (any::<bool>(), prop::option::of(1u64..64), any::<bool>()).prop_map(
        |(not_empty, length, allow_macro)| {
            let mut row = vec![json!("string")];
            if not_empty {
                row.push(json!("not_empty"));
            }
            if allow_macro {
                row.push(json!("allow_macro"));
            }
            if let Some(length) = length {
                row.push(json!({"length": length}));
            }
            Value::Array(row)
        },
    );

    let membership = prop::collection::vec(0i64..20, 1..5).prop_map(|values| {
        let csv = values
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        json!(["integer", format!("in {}", csv)])
    });

    prop_oneof![
        integer,
        string,
        membership,
        Just(json!(["id"])),
        Just(json!(["float"])),
        Just(json!(["boolean"])),
        Just(json!({"type": "boolean"})),
    ]
}

/// Strategy for a flat schema of up to six fields.
fn arb_schema() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}", arb_scalar_row(), 1..6).prop_map(|fields| {
        let map: Map<String, Value> = fields.into_iter().collect();
        Value::Object(map)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // The canonical form normalizes to itself.
    #[test]
    fn canonical_form_is_a_fixed_point(schema in arb_schema()) {
        let rule = normalize(&schema).expect("generated schema should normalize");
        let again = normalize(&to_value(&rule)).expect("canonical form should normalize");
        prop_assert_eq!(&rule, &again);
    }

    #[test]
    fn canonical_yaml_parses_back(schema in arb_schema()) {
        let rule = normalize(&schema).expect("generated schema should normalize");
        let yaml = to_yaml(&rule).expect("canonical form should serialize");
        let raw = parse_rules(&yaml).expect("serialized rules should parse");
        let again = normalize(&raw).expect("parsed rules should normalize");
        prop_assert_eq!(&rule, &again);
    }

    #[test]
    fn every_declared_field_is_kept_in_order(schema in arb_schema()) {
        let rule = normalize(&schema).expect("generated schema should normalize");
        let RuleKind::Object(object) = &rule.kind else {
            panic!("root should normalize to an object rule");
        };
        let names: Vec<&str> = object.fields.iter().map(|f| f.name.as_str()).collect();
        let declared: Vec<&str> = schema
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        prop_assert_eq!(names, declared);
    }

    // Unknown tokens never panic and always come back as schema errors.
    #[test]
    fn unknown_tokens_are_rejected(token in "[a-z]{3,10}") {
        prop_assume!(RuleType::from_token(&token).is_none());
        prop_assume!(!["required", "not_empty", "allow_macro", "deprecated"].contains(&token.as_str()));

        let error = normalize(&json!({"a": [token]})).expect_err("unknown token should be rejected");
        prop_assert_eq!(error.kind, SchemaErrorKind::UnknownRule);
        prop_assert_eq!(error.path, "/a");
    }
}
