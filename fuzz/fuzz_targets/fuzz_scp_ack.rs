//! Fuzz target for SCP acknowledgement parsing.
//!
//! This tests that `parse_ack` never panics on arbitrary sink output
//! and never claims to consume more bytes than it was given.

#![no_main]

use file_replication::transport::{parse_ack, Ack};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match parse_ack(data) {
        Ack::Ok(consumed) => assert!(consumed <= data.len()),
        Ack::Incomplete => assert!(data.is_empty() || data[0] == 1 || data[0] == 2),
        Ack::Error(_) => {}
    }
});
