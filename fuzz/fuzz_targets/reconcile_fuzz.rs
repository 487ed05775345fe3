#![no_main]
use std::io::Cursor;

use dirvi::engine::{self, Outcome, ReconcileOptions};
use dirvi::index::BaselineIndex;
use dirvi::record::NativeFormat;
use dirvi::sink::Statistics;
use libfuzzer_sys::fuzz_target;

const BASELINE: &[u8] = b"version: ldapvi\n\
    \n0 dc=x\ndc: x\n\
    \n1 cn=a,dc=x\ncn: a\nsn: one\n\
    \n2 cn=b,dc=x\ncn: b\n";

fuzz_target!(|data: &[u8]| {
    let mut index = BaselineIndex::from_offsets([17, 31, 58]);
    let before = index.clone();
    let mut stats = Statistics::default();
    let outcome = engine::reconcile(
        &NativeFormat,
        &mut stats,
        &mut index,
        &mut Cursor::new(BASELINE.to_vec()),
        &mut Cursor::new(data),
        &ReconcileOptions::default(),
    );
    // Statistics never rejects, so every pass ends with its markers reset.
    if let Ok(Outcome::Success | Outcome::SyntaxError { .. }) = outcome {
        assert_eq!(index, before);
    }
});
