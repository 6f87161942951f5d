//! Fuzz target for config loading.
//!
//! Arbitrary JSON must either fail to parse or produce a config whose
//! validation and duration accessors don't panic.

#![no_main]

use file_replication::ReplicatorConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = serde_json::from_slice::<ReplicatorConfig>(data) else {
        return;
    };

    // Should never panic
    let valid = config.validate().is_ok();
    let interval = config.watch.interval_duration();
    let _ = config.remote.connect_timeout_duration();
    let _ = config.remote.operation_timeout_duration();
    let _ = config.retry.retry_config().total_delay();

    if valid {
        assert!(!interval.is_zero());
    }
});
