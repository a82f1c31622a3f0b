#![no_main]
use libfuzzer_sys::fuzz_target;
use xmldom::parser::{ParseOption, ParseOptions};
use xmldom::Document;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let (flags, input) = data.split_at(4);
    let flags = ParseOption::from_bits_truncate(u32::from_le_bytes([
        flags[0], flags[1], flags[2], flags[3],
    ]));
    // Any byte input under any option set: errors are fine, panics are not.
    let _ = Document::parse_bytes(input, &ParseOptions::from(flags));
});
