#![no_main]

use df_parser::{explanation_prefix, extract_candidate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let _ = explanation_prefix(raw);
    if let Ok(candidate) = extract_candidate(raw) {
        assert!(candidate.ends_with('}'));
        assert!(raw.contains(candidate.as_str()));
    }
});
