#![no_main]
use std::io::Cursor;

use dirvi::record::{LdifFormat, NativeFormat, RecordFormat};
use libfuzzer_sys::fuzz_target;

fn drain<F: RecordFormat>(format: &F, data: &[u8]) {
    let mut r = Cursor::new(data);
    // Every successful read consumes at least one line.
    for _ in 0..data.len() + 1 {
        match format.read_record(&mut r, None) {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
}

fuzz_target!(|data: &[u8]| {
    drain(&NativeFormat, data);
    drain(&LdifFormat, data);
});
