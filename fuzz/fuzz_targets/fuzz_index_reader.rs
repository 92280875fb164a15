#![no_main]

use libfuzzer_sys::fuzz_target;
use nutrimatic::index::{inspect, IndexReader};
use std::io;

fuzz_target!(|data: &[u8]| {
    // Corrupt indexes must surface as errors, not panics or endless walks
    if let Ok(reader) = IndexReader::from_bytes(data.to_vec()) {
        let _ = inspect::dump_index(&reader, &mut io::sink());
    }
});
