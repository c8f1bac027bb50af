use formrules::primitives::*;
use formrules::types::InOption;
use serde_json::json;

#[test]
fn int32_accepts_numbers_and_decimal_strings() {
    assert_eq!(parse_int32(&json!(42)), Some(42));
    assert_eq!(parse_int32(&json!("0002")), Some(2));
    assert_eq!(parse_int32(&json!("-0005")), Some(-5));
    assert_eq!(parse_int32(&json!(2147483647)), Some(2147483647));
    assert_eq!(parse_int32(&json!(-2147483648i64)), Some(-2147483648));
}

#[test]
fn int32_rejects_everything_else() {
    for value in [
        json!(2147483648i64),
        json!("2147483648"),
        json!(1.5),
        json!("1.0"),
        json!(" 1"),
        json!(""),
        json!(true),
        json!(null),
        json!([1]),
    ] {
        assert_eq!(parse_int32(&value), None, "value: {}", value);
    }
}

#[test]
fn float_accepts_decimal_and_exponent_strings() {
    assert_eq!(parse_float(&json!("1.5")), Some(1.5));
    assert_eq!(parse_float(&json!("-.5")), Some(-0.5));
    assert_eq!(parse_float(&json!("1e3")), Some(1000.0));
    assert_eq!(parse_float(&json!(7)), Some(7.0));
    assert_eq!(parse_float(&json!("NaN")), None);
    assert_eq!(parse_float(&json!("inf")), None);
    assert_eq!(parse_float(&json!("1e999")), None);
}

#[test]
fn id_is_canonicalized() {
    assert_eq!(parse_id(&json!("0042"), u64::MAX), Some("42".to_string()));
    assert_eq!(parse_id(&json!("000"), u64::MAX), Some("0".to_string()));
    assert_eq!(parse_id(&json!(17), u64::MAX), Some("17".to_string()));
    assert_eq!(parse_id(&json!("-1"), u64::MAX), None);
    assert_eq!(parse_id(&json!("1a"), u64::MAX), None);
    assert_eq!(parse_id(&json!(""), u64::MAX), None);
    assert_eq!(parse_id(&json!("11"), 10), None);
    assert_eq!(
        parse_id(&json!("00000000000000000000000000001"), u64::MAX),
        Some("1".to_string())
    );
}

#[test]
fn ranges_are_inclusive_and_may_be_open() {
    let options = vec![
        InOption::Scalar(json!(1)),
        InOption::Range {
            from: Some(4.into()),
            to: Some(6.into()),
        },
        InOption::Range {
            from: Some(100.into()),
            to: None,
        },
    ];
    for value in [1.0, 4.0, 5.5, 6.0, 100.0, 1e9] {
        assert!(number_matches_any(value, &options), "value: {}", value);
    }
    for value in [0.0, 2.0, 6.5, 99.9] {
        assert!(!number_matches_any(value, &options), "value: {}", value);
    }
}

#[test]
fn string_membership_is_textual() {
    let options = vec![InOption::Scalar(json!("01")), InOption::Scalar(json!("a"))];
    assert!(string_matches_any("01", &options));
    assert!(!string_matches_any("1", &options));
    assert!(!string_matches_any("A", &options));
}

#[test]
fn user_macros_are_parsed() {
    assert_eq!(
        parse_user_macro("{$MACRO}"),
        Some(UserMacro {
            name: "MACRO".to_string(),
            context: None,
        })
    );

    let with_context = parse_user_macro("{$A.B:regex:\"^x\"}").expect("valid macro");
    assert_eq!(with_context.name, "A.B");
    assert_eq!(
        with_context.context,
        Some(MacroContext {
            regex: true,
            value: "^x".to_string(),
        })
    );

    for input in ["{$lower}", "{MACRO}", "$MACRO", "{$MACRO", "{$A:\"x\" y}"] {
        assert_eq!(parse_user_macro(input), None, "input: {}", input);
    }
}

#[test]
fn equal_macros_share_canonical_text() {
    assert_eq!(
        canonical_macro_or_self("{$M: ctx }"),
        canonical_macro_or_self("{$M:\"ctx\"}")
    );
    assert_ne!(
        canonical_macro_or_self("{$M:a}"),
        canonical_macro_or_self("{$M:b}")
    );
    assert_eq!(canonical_macro_or_self("plain"), "plain");
}

#[test]
fn time_units_convert_to_seconds() {
    assert_eq!(parse_time_unit("30"), Ok(30));
    assert_eq!(parse_time_unit("5m"), Ok(300));
    assert_eq!(parse_time_unit("2d"), Ok(172_800));
    assert_eq!(parse_time_unit("1w"), Ok(604_800));
    assert!(parse_time_unit("5y").is_err());
    assert!(parse_time_unit("m").is_err());
    assert!(parse_time_unit("").is_err());
}

#[test]
fn image_signatures_are_recognized() {
    assert!(looks_like_image(b"\x89PNG\r\n\x1a\nrest"));
    assert!(looks_like_image(b"\xff\xd8\xff\xe0"));
    assert!(looks_like_image(b"GIF89a...."));
    assert!(!looks_like_image(b"#!/bin/sh\n"));
    assert!(!looks_like_image(b""));
}

#[test]
fn sizes_render_with_binary_prefixes() {
    assert_eq!(human_size(512), "512 B");
    assert_eq!(human_size(2 * 1024 * 1024), "2 MB");
    assert_eq!(human_size(1536), "1.5 KB");
}

#[test]
fn blank_values() {
    for value in [json!(null), json!(""), json!([]), json!({}), json!(false)] {
        assert!(is_blank(&value), "value: {}", value);
    }
    for value in [json!(0), json!("0"), json!([null]), json!(true)] {
        assert!(!is_blank(&value), "value: {}", value);
    }
}
