//! Fuzz target for remote path construction.
//!
//! Tests that destination joining and the sink command quoting never
//! panic, and that the quoted command stays a single shell word.

#![no_main]

use file_replication::resilience::remote_destination;
use file_replication::transport::scp_sink_command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (base, name) = data;

    let dest = remote_destination(base, name);
    assert!(dest.ends_with(name));

    let command = scp_sink_command(&dest);
    assert!(command.starts_with("scp -t '"));
    assert!(command.ends_with('\''));
});
