#![no_main]

use libfuzzer_sys::fuzz_target;
use nutrimatic::query::{parse_pattern, Automaton};

fuzz_target!(|data: &str| {
    // Parsing and compiling must never panic, only return errors
    if let Ok(pattern) = parse_pattern(data) {
        let _ = Automaton::compile(&pattern.whole_words(), 2_000);
    }
});
