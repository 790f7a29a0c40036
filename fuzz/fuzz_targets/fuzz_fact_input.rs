// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for loosely-typed fact validation

#![no_main]

use libfuzzer_sys::fuzz_target;
use nexus_ingest::FactInput;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = serde_json::from_slice::<FactInput>(data) {
        if let Ok(fact) = input.into_fact() {
            assert!(!fact.subject.trim().is_empty());
            assert!(!fact.object.trim().is_empty());
        }
    }
});
