// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replicator state and report types.
//!
//! # State Transitions
//!
//! ```text
//!            run()                 shutdown signal
//! Created ──────────→ Running ─────────────────────→ ShuttingDown
//!                                                         │
//!                                                         ↓ (in-flight tick finished)
//!                                                      Stopped
//! ```
//!
//! - **Created**: after `Replicator::new()`. `tick()` may already be called directly.
//! - **Running**: the periodic loop is active.
//! - **ShuttingDown**: shutdown observed; no new tick will start.
//! - **Stopped**: the loop has exited.

use crate::records::{QueueId, ReplicationStatus};
use std::time::Duration;

/// State of the replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created but the periodic loop has not started.
    Created,
    /// Periodic loop running.
    Running,
    /// Shutdown signaled, finishing the current tick.
    ShuttingDown,
    /// Loop exited.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Created => write!(f, "Created"),
            EngineState::Running => write!(f, "Running"),
            EngineState::ShuttingDown => write!(f, "ShuttingDown"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Outcome of one file's trip through the pipeline.
///
/// Only produced once the Pending record exists and the transfer sequence
/// has finished; a failed Pending insert is an `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationReport {
    pub file_name: String,
    pub queue_id: QueueId,
    /// `Completed` or `Failed`.
    pub status: ReplicationStatus,
    /// Transfer attempts used.
    pub attempts: usize,
    /// Last attempt's error when `status` is `Failed`.
    pub error_message: Option<String>,
    /// Time from the Pending insert to the end of the transfer sequence.
    pub duration: Duration,
    /// Whether the queue record reached its terminal status.
    pub queue_updated: bool,
    /// Whether the audit record was written.
    pub audit_written: bool,
}

impl ReplicationReport {
    pub fn is_completed(&self) -> bool {
        self.status == ReplicationStatus::Completed
    }

    /// Both post-transfer store writes succeeded.
    pub fn fully_recorded(&self) -> bool {
        self.queue_updated && self.audit_written
    }
}

/// Statistics from one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Another tick was in progress; nothing was done.
    pub skipped: bool,
    /// The watched directory could not be listed.
    pub discovery_error: Option<String>,
    /// Regular files found in the watched directory.
    pub listed: usize,
    /// Files not yet seen by the dedup tracker.
    pub new_files: usize,
    /// Files whose transfer sequence ended in `Completed`.
    pub completed: usize,
    /// Files whose transfer sequence ended in `Failed`.
    pub failed: usize,
    /// Files that could not be queued (left unseen for the next tick).
    pub errors: usize,
    /// The dedup tracker was cleared at the end of the tick.
    pub dedup_reset: bool,
    /// Per-file reports in processing order.
    pub reports: Vec<ReplicationReport>,
}

impl TickReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Number of files that reached a terminal status this tick.
    pub fn handled(&self) -> usize {
        self.completed + self.failed
    }
}
