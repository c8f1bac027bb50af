#![no_main]

use std::sync::LazyLock;

use formrules::{FileMap, FormValidator};
use libfuzzer_sys::fuzz_target;
use serde_json::json;

static VALIDATOR: LazyLock<FormValidator> = LazyLock::new(|| {
    FormValidator::new(&json!({
        "name": ["string", "required", {"length": 16}],
        "type": ["integer", "in 0:3"],
        "port": [
            ["integer", {"when": ["type", "in 0"], "min": 1, "max": 65535}],
            ["string", "allow_macro"],
        ],
        "tags": ["objects", {"fields": {"tag": ["string"], "value": ["string"]}, "uniq": [["tag", "value"]]}],
        "ids": ["array", {"field": ["id"]}],
        "delay": ["string", {"use": ["time_unit", {"usermacros": true}]}],
    }))
    .expect("fuzz schema must normalize")
});

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let report = VALIDATOR.validate(&value, &FileMap::new());
        if report.is_success() {
            assert!(report.data.is_object());
        }
    }
});
