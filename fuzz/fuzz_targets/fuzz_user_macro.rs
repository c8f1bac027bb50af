#![no_main]

use formrules::primitives::parse_user_macro;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    if let Some(user_macro) = parse_user_macro(&s) {
        let canonical = user_macro.canonical();
        if let Some(again) = parse_user_macro(&canonical) {
            assert_eq!(again.canonical(), canonical);
        }
    }
});
