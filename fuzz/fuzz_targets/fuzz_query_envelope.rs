//! Fuzz target: JSON deserialization of `QueryEnvelope`.
//!
//! Verifies that arbitrary byte sequences fed to the request body decoder
//! never cause panics or UB.

#![no_main]

use libfuzzer_sys::fuzz_target;
use scriptgate_core::QueryEnvelope;

fuzz_target!(|data: &[u8]| {
    // Errors are expected; panics are not.
    if let Ok(envelope) = serde_json::from_slice::<QueryEnvelope>(data) {
        assert_eq!(envelope.into_args().len(), 2);
    }
});
