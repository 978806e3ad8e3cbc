#![no_main]

use df_parser::{is_valid, sanitize, validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let accepted = validate(text).is_ok();
    assert_eq!(accepted, is_valid(text));

    if let Ok(once) = sanitize(text) {
        let twice = sanitize(&once).expect("sanitized text stays non-empty");
        assert_eq!(once, twice);
    }
});
