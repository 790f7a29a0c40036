// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for arbiter reply parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use nexus_healer::ArbiterDecision;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let decision = ArbiterDecision::from_text(s);
        assert!((0.0..=1.0).contains(&decision.confidence));
        if decision.is_error() {
            assert_eq!(decision.confidence, 0.0);
        }
    }
});
