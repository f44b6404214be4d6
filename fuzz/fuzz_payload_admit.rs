//! Fuzz target for payload admission.
//!
//! Run with: cargo +nightly fuzz run fuzz_payload_admit
//!
//! The first two bytes pick the limit and policy, the rest is the received
//! buffer. Admitted payloads must never exceed the limit.

#![no_main]

use drinksbar_config::OversizePolicy;
use drinksbar_core::{PayloadLimit, TransferError};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let max = usize::from(data[0]).max(1);
    let policy = if data[1] & 1 == 0 {
        OversizePolicy::Truncate
    } else {
        OversizePolicy::Reject
    };
    let received = &data[2..];

    match PayloadLimit::new(max, policy).admit(received) {
        Ok(payload) => {
            assert!(!payload.is_empty());
            assert!(payload.len() <= max);
            assert_eq!(payload.is_truncated(), received.len() > max);
            let _ = payload.text();
        }
        Err(TransferError::Empty) => assert!(received.is_empty()),
        Err(TransferError::Oversize { max: m }) => {
            assert_eq!(m, max);
            assert!(received.len() > max);
        }
        Err(other) => panic!("unexpected admission error: {other}"),
    }
});
