// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record types flowing through the pipeline.
//!
//! - [`CandidateFile`]: a file found in the watched directory (never persisted)
//! - [`NewQueueRecord`] / [`QueueRecord`]: the mutable per-file tracking row
//! - [`AuditRecord`]: the immutable terminal outcome ([`AuditEntry`] once stored)
//!
//! # Queue Record Lifecycle
//!
//! ```text
//! insert (Pending) ──► transfer ──► update (Completed | Failed) ──► audit
//! ```
//!
//! A queue record transitions exactly once out of `Pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Status vocabulary shared by queue and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationStatus {
    /// Queued, transfer not yet finished.
    Pending,
    /// Transfer succeeded.
    Completed,
    /// Every transfer attempt failed.
    Failed,
}

impl ReplicationStatus {
    /// The exact string stored in the status columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationStatus::Pending => "Pending",
            ReplicationStatus::Completed => "Completed",
            ReplicationStatus::Failed => "Failed",
        }
    }

    /// Whether this status ends the record's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReplicationStatus::Pending)
    }
}

impl fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ReplicationStatus::Pending),
            "Completed" => Ok(ReplicationStatus::Completed),
            "Failed" => Ok(ReplicationStatus::Failed),
            other => Err(format!("unknown replication status: {other}")),
        }
    }
}

/// Store-assigned identifier of a queue record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueId(pub i64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file discovered in the watched directory during one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Full local path (unique within one pass).
    pub path: PathBuf,
    /// File name, also used as the remote file name.
    pub name: String,
    /// Size at discovery time.
    pub size_bytes: u64,
    /// Birth time when the filesystem reports one, else mtime, else discovery time.
    pub created_at: DateTime<Utc>,
}

impl CandidateFile {
    /// Identity used by the dedup tracker (the full path).
    pub fn dedup_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Fields supplied when a file enters the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueRecord {
    pub file_name: String,
    pub file_size: i64,
    pub source_region: String,
    pub target_region: String,
    pub status: ReplicationStatus,
    /// Source file creation time, not processing time.
    pub upload_time: DateTime<Utc>,
}

/// A queue record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub queue_id: QueueId,
    pub file_name: String,
    pub file_size: i64,
    pub source_region: String,
    pub target_region: String,
    pub status: ReplicationStatus,
    pub upload_time: DateTime<Utc>,
    pub replication_start_time: Option<DateTime<Utc>>,
    pub replication_end_time: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
}

/// Append-only record of one terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub file_name: String,
    pub file_size: i64,
    pub status: ReplicationStatus,
    pub source_region: String,
    pub target_region: String,
    pub upload_time: DateTime<Utc>,
    /// End of the transfer sequence.
    pub replication_time: DateTime<Utc>,
    pub replication_duration_ms: i64,
    /// `None` on success, the last attempt's message on failure.
    pub error_message: Option<String>,
}

/// An audit record as stored, with its store-assigned fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: i64,
    pub record: AuditRecord,
    pub created_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(ReplicationStatus::Pending.to_string(), "Pending");
        assert_eq!(ReplicationStatus::Completed.to_string(), "Completed");
        assert_eq!(ReplicationStatus::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Pending".parse::<ReplicationStatus>(), Ok(ReplicationStatus::Pending));
        assert_eq!("Completed".parse::<ReplicationStatus>(), Ok(ReplicationStatus::Completed));
        assert_eq!("Failed".parse::<ReplicationStatus>(), Ok(ReplicationStatus::Failed));
        assert!("completed".parse::<ReplicationStatus>().is_err());
        assert!("".parse::<ReplicationStatus>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!ReplicationStatus::Pending.is_terminal());
        assert!(ReplicationStatus::Completed.is_terminal());
        assert!(ReplicationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_dedup_key_is_full_path() {
        let candidate = CandidateFile {
            path: PathBuf::from("/mnt/out/a.txt"),
            name: "a.txt".to_string(),
            size_bytes: 500,
            created_at: Utc::now(),
        };
        assert_eq!(candidate.dedup_key(), "/mnt/out/a.txt");
    }

    #[test]
    fn test_queue_id_display() {
        assert_eq!(QueueId(42).to_string(), "42");
        assert!(QueueId(1) < QueueId(2));
    }
}
