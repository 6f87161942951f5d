// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory dedup tracker.
//!
//! Remembers which files have already been handed to the pipeline during
//! this process lifetime. The set is bounded by a high-water mark: once a
//! tick leaves it larger than the mark, the whole set is cleared.
//!
//! ```text
//! tick N:   seen = {a, b, ..., k}   len > hwm  ──► maybe_reset() clears
//! tick N+1: seen = {}                          ──► files still present are resubmitted
//! ```
//!
//! Resubmission after a reset is safe because the transport overwrites the
//! remote copy. The tracker is not persisted; a restart resubmits everything
//! still in the watched directory.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Default dedup set bound.
pub const DEFAULT_HIGH_WATER_MARK: usize = 10_000;

/// Process-wide set of dedup keys already handled.
#[derive(Debug)]
pub struct DedupTracker {
    keys: Mutex<HashSet<String>>,
    high_water_mark: usize,
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATER_MARK)
    }
}

impl DedupTracker {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
            high_water_mark,
        }
    }

    // A panic while holding the lock cannot leave the set half-updated, so
    // the data is still usable after poisoning.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether `key` has already been handled.
    pub fn seen(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Record `key` as handled.
    pub fn mark_seen(&self, key: impl Into<String>) {
        self.lock().insert(key.into());
    }

    /// Clear the set if it has grown beyond the high-water mark.
    ///
    /// Returns `true` when a reset happened.
    pub fn maybe_reset(&self) -> bool {
        let mut keys = self.lock();
        if keys.len() > self.high_water_mark {
            let dropped = keys.len();
            keys.clear();
            drop(keys);
            info!(dropped, high_water_mark = self.high_water_mark, "Dedup tracker reset");
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_and_seen() {
        let tracker = DedupTracker::new(10);
        assert!(!tracker.seen("/mnt/out/a.txt"));

        tracker.mark_seen("/mnt/out/a.txt");
        assert!(tracker.seen("/mnt/out/a.txt"));
        assert!(!tracker.seen("/mnt/out/b.txt"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_mark_twice_is_idempotent() {
        let tracker = DedupTracker::new(10);
        tracker.mark_seen("a");
        tracker.mark_seen("a");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_no_reset_at_high_water_mark() {
        let tracker = DedupTracker::new(3);
        for key in ["a", "b", "c"] {
            tracker.mark_seen(key);
        }
        assert!(!tracker.maybe_reset());
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_reset_above_high_water_mark() {
        let tracker = DedupTracker::new(3);
        for key in ["a", "b", "c", "d"] {
            tracker.mark_seen(key);
        }
        assert!(tracker.maybe_reset());
        assert!(tracker.is_empty());
        assert!(!tracker.seen("a"));
    }

    #[test]
    fn test_default_high_water_mark() {
        assert_eq!(DedupTracker::default().high_water_mark(), 10_000);
    }

    #[test]
    fn test_survives_poisoned_lock() {
        let tracker = Arc::new(DedupTracker::new(10));
        tracker.mark_seen("before");

        let clone = Arc::clone(&tracker);
        let _ = std::thread::spawn(move || {
            let _guard = clone.keys.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(tracker.keys.is_poisoned());
        assert!(tracker.seen("before"));
        tracker.mark_seen("after");
        assert_eq!(tracker.len(), 2);
    }
}
