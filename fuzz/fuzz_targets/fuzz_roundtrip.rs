#![no_main]
use libfuzzer_sys::fuzz_target;
use xmldom::parser::{parse_str_with_options, ParseOption, ParseOptions};
use xmldom::serial::serialize;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(s) = std::str::from_utf8(rest) else {
        return;
    };
    let mut flags = ParseOption::empty();
    flags.set(ParseOption::NO_ENT, selector & 1 != 0);
    flags.set(ParseOption::NSCLEAN, selector & 2 != 0);
    flags.set(ParseOption::DTD_ATTR, selector & 4 != 0);
    flags.set(ParseOption::COMPACT, selector & 8 != 0);
    let opts = ParseOptions::from(flags);

    // Accepted input must survive serialize -> parse unchanged.
    if let Ok(doc) = parse_str_with_options(s, &opts) {
        let output = serialize(&doc, false);
        let again = parse_str_with_options(&output, &opts)
            .unwrap_or_else(|e| panic!("re-parse of {output:?} failed: {e}"));
        assert!(doc.structurally_eq(&again), "roundtrip changed {output:?}");
        let _ = serialize(&doc, true);
    }
});
