use formrules::config::DEFAULT_MAX_ID;
use formrules::primitives::{parse_id, parse_int32};
use formrules::*;
use proptest::prelude::*;
use serde_json::{Value, json};

fn bounded() -> FormValidator {
    FormValidator::new(&json!({"n": ["integer", {"min": 1, "max": 10, "not_in": [5]}]}))
        .expect("schema should normalize")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bounded_integer_acceptance(n in -100i64..100, as_text in any::<bool>()) {
        let value = if as_text { json!(n.to_string()) } else { json!(n) };
        let report = bounded().validate(&json!({"n": value}), &FileMap::new());

        let expected = (1..=10).contains(&n) && n != 5;
        prop_assert_eq!(report.is_success(), expected, "n = {}", n);
        if expected {
            prop_assert_eq!(&report.data, &json!({"n": n}));
        }
    }

    #[test]
    fn id_strips_leading_zeros(n in any::<u32>(), zeros in 0usize..4) {
        let text = format!("{}{}", "0".repeat(zeros), n);
        prop_assert_eq!(parse_id(&json!(text), DEFAULT_MAX_ID), Some(n.to_string()));
    }

    #[test]
    fn id_rejects_non_digits(text in "[0-9]{0,3}[a-z+. -][0-9]{0,3}") {
        prop_assert_eq!(parse_id(&Value::String(text), DEFAULT_MAX_ID), None);
    }

    #[test]
    fn int32_text_and_number_agree(n in any::<i32>()) {
        let n = i64::from(n);
        prop_assert_eq!(parse_int32(&json!(n)), Some(n));
        prop_assert_eq!(parse_int32(&json!(n.to_string())), Some(n));
    }

    #[test]
    fn int32_rejects_out_of_range(n in (i64::from(i32::MAX) + 1)..i64::MAX) {
        prop_assert_eq!(parse_int32(&json!(n)), None);
        prop_assert_eq!(parse_int32(&json!(-n)), None);
    }
}
