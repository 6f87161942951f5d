// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-file pipeline: enqueue, transfer, record.
//!
//! # Algorithm
//!
//! 1. Insert a Pending queue record (must succeed before any transfer)
//! 2. Run the retrying transfer
//! 3. Move the queue record to Completed or Failed
//! 4. Append the matching audit record
//!
//! Steps 3 and 4 are attempted regardless of each other. Their failures are
//! logged and flagged on the report; the transfer is never repeated because
//! of them.

use super::{ReplicationReport, Replicator};
use crate::error::Result;
use crate::metrics;
use crate::records::{AuditRecord, CandidateFile, NewQueueRecord, ReplicationStatus};
use crate::store::StatusStore;
use crate::transport::Transport;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info};

impl<T: Transport, S: StatusStore> Replicator<T, S> {
    /// Drive one candidate through the pipeline.
    ///
    /// Returns `Err` only when the Pending record could not be created; in
    /// that case no transfer was attempted. A transfer that exhausts its
    /// retries is a `Failed` report, not an error.
    pub async fn replicate(&self, candidate: &CandidateFile) -> Result<ReplicationReport> {
        let upload_time = candidate.created_at;
        let start_time = Utc::now();
        let started = Instant::now();
        let file_size = i64::try_from(candidate.size_bytes).unwrap_or(i64::MAX);
        let regions = &self.config.regions;

        let pending = NewQueueRecord {
            file_name: candidate.name.clone(),
            file_size,
            source_region: regions.source.clone(),
            target_region: regions.target.clone(),
            status: ReplicationStatus::Pending,
            upload_time,
        };

        let queue_id = match self.store.insert_queue_record(&pending).await {
            Ok(id) => id,
            Err(e) => {
                metrics::record_store_failure("insert_queue_record");
                error!(file = %candidate.name, error = %e, "Failed to queue file, skipping transfer");
                return Err(e);
            }
        };

        debug!(file = %candidate.name, queue_id = %queue_id, size = candidate.size_bytes, "File queued");

        let (status, attempts, error_message) =
            match self.transfer.send_attempts(&candidate.path, &candidate.name).await {
                Ok(report) => (ReplicationStatus::Completed, report.attempts, None),
                Err(failure) => (
                    ReplicationStatus::Failed,
                    failure.attempts,
                    Some(failure.last_error.to_string()),
                ),
            };

        let end_time = Utc::now();
        let duration = started.elapsed();

        let queue_updated = match self
            .store
            .update_queue_record(queue_id, status, start_time, end_time)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                metrics::record_store_failure("update_queue_record");
                error!(file = %candidate.name, queue_id = %queue_id, status = %status, error = %e, "Failed to update queue record");
                false
            }
        };

        let audit = AuditRecord {
            file_name: candidate.name.clone(),
            file_size,
            status,
            source_region: regions.source.clone(),
            target_region: regions.target.clone(),
            upload_time,
            replication_time: end_time,
            replication_duration_ms: (end_time - start_time).num_milliseconds(),
            error_message: error_message.clone(),
        };

        let audit_written = match self.store.insert_audit_record(&audit).await {
            Ok(()) => true,
            Err(e) => {
                metrics::record_store_failure("insert_audit_record");
                error!(file = %candidate.name, queue_id = %queue_id, status = %status, error = %e, "Failed to write audit record");
                false
            }
        };

        metrics::record_replication(status.as_str(), candidate.size_bytes, duration);

        match &error_message {
            None => info!(
                file = %candidate.name,
                queue_id = %queue_id,
                attempts,
                duration_ms = duration.as_millis() as u64,
                "File replicated"
            ),
            Some(message) => error!(
                file = %candidate.name,
                queue_id = %queue_id,
                attempts,
                error = %message,
                "File replication failed"
            ),
        }

        Ok(ReplicationReport {
            file_name: candidate.name.clone(),
            queue_id,
            status,
            attempts,
            error_message,
            duration,
            queue_updated,
            audit_written,
        })
    }
}
