#![no_main]

use formrules::DataPath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, &str)| {
    let (path, reference) = input;
    let from = DataPath::parse(path);
    let resolved = from.resolve_reference(reference);
    let _ = from.resolve_from_container(reference);
    assert_eq!(DataPath::parse(&resolved.to_string()), resolved);
});
