// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Tick outcomes (completed, skipped, discovery failures)
//! - Discovery and dedup counts
//! - Transfer attempts and their latency
//! - Terminal replication outcomes
//! - Status store failures and busy retries
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `file_replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed here; until the host installs one every call is a no-op.
//!
//! # Usage
//!
//! ```rust,no_run
//! use file_replication::metrics;
//! use std::time::Duration;
//!
//! metrics::record_tick("completed");
//! metrics::record_transfer_attempt("success", Duration::from_millis(850));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Tick Metrics
// =============================================================================

/// Record a tick by outcome (`completed`, `skipped`, `discovery_failed`).
pub fn record_tick(outcome: &'static str) {
    counter!("file_replication_ticks_total", "outcome" => outcome).increment(1);
}

/// Record a full tick duration.
pub fn record_tick_duration(duration: Duration) {
    histogram!("file_replication_tick_duration_seconds").record(duration.as_secs_f64());
}

/// Record files listed in the watched directory and how many were new.
pub fn record_discovery(listed: usize, new: usize) {
    counter!("file_replication_files_discovered_total").increment(listed as u64);
    counter!("file_replication_files_deduped_total").increment(listed.saturating_sub(new) as u64);
}

// =============================================================================
// Transfer Metrics
// =============================================================================

/// Record one transfer attempt (`success` or `failure`) and its latency.
pub fn record_transfer_attempt(outcome: &'static str, duration: Duration) {
    counter!("file_replication_transfer_attempts_total", "outcome" => outcome).increment(1);
    histogram!("file_replication_transfer_attempt_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record a terminal replication outcome and the file's size.
pub fn record_replication(status: &str, size_bytes: u64, duration: Duration) {
    counter!("file_replication_replications_total", "status" => status.to_string()).increment(1);
    histogram!("file_replication_file_size_bytes").record(size_bytes as f64);
    histogram!("file_replication_replication_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
}

// =============================================================================
// Store Metrics
// =============================================================================

/// Record a failed status store write.
pub fn record_store_failure(operation: &'static str) {
    counter!("file_replication_store_failures_total", "operation" => operation).increment(1);
}

/// Record a SQLITE_BUSY/SQLITE_LOCKED retry.
pub fn store_busy_retry(operation: &str) {
    counter!("file_replication_store_busy_retries_total", "operation" => operation.to_string())
        .increment(1);
}

// =============================================================================
// Dedup / Lifecycle
// =============================================================================

/// Gauge for the dedup tracker size.
pub fn set_dedup_size(size: usize) {
    gauge!("file_replication_dedup_keys").set(size as f64);
}

/// Record a dedup tracker reset.
pub fn record_dedup_reset() {
    counter!("file_replication_dedup_resets_total").increment(1);
}

/// Gauge for replicator state.
pub fn set_engine_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "ShuttingDown" => 2.0,
        "Stopped" => 3.0,
        _ => -1.0,
    };
    gauge!("file_replication_engine_state").set(value);
}
