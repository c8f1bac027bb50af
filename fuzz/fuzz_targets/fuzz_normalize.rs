#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    if let Ok(raw) = formrules::parse_rules(&s)
        && let Ok(rule) = formrules::normalize(&raw)
    {
        let canonical = formrules::serialize::to_value(&rule);
        let again = formrules::normalize(&canonical).expect("canonical rules must normalize");
        assert_eq!(rule, again);
    }
});
