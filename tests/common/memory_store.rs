//! In-memory StatusStore for testing.
//!
//! Keeps queue and audit records in vectors and can be told to fail any of
//! the three writes.

use chrono::{DateTime, Utc};
use file_replication::{
    AuditRecord, BoxFuture, NewQueueRecord, QueueId, QueueRecord, ReplicationError,
    ReplicationStatus, StatusStore,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Recording implementation of [`StatusStore`].
pub struct MemoryStatusStore {
    queue: RwLock<Vec<QueueRecord>>,
    audit: RwLock<Vec<AuditRecord>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_audits: AtomicBool,
    /// Number of insert_queue_record() calls, including failed ones
    insert_calls: AtomicUsize,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self {
            queue: RwLock::new(Vec::new()),
            audit: RwLock::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_audits: AtomicBool::new(false),
            insert_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn fail_audits(&self, fail: bool) {
        self.fail_audits.store(fail, Ordering::SeqCst);
    }

    pub async fn queue_records(&self) -> Vec<QueueRecord> {
        self.queue.read().await.clone()
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.read().await.clone()
    }

    #[allow(dead_code)]
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Total successful writes of any kind.
    #[allow(dead_code)]
    pub async fn write_count(&self) -> usize {
        let queue = self.queue.read().await;
        let updated = queue.iter().filter(|r| r.status.is_terminal()).count();
        queue.len() + updated + self.audit.read().await.len()
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore for MemoryStatusStore {
    fn insert_queue_record<'a>(&'a self, record: &'a NewQueueRecord) -> BoxFuture<'a, QueueId> {
        Box::pin(async move {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(ReplicationError::store_msg(
                    "insert_queue_record",
                    "simulated insert failure",
                ));
            }

            let mut queue = self.queue.write().await;
            let queue_id = QueueId(queue.len() as i64 + 1);
            let now = Utc::now();
            queue.push(QueueRecord {
                queue_id,
                file_name: record.file_name.clone(),
                file_size: record.file_size,
                source_region: record.source_region.clone(),
                target_region: record.target_region.clone(),
                status: record.status,
                upload_time: record.upload_time,
                replication_start_time: None,
                replication_end_time: None,
                created_date: now,
                modified_date: now,
            });
            Ok(queue_id)
        })
    }

    fn update_queue_record(
        &self,
        queue_id: QueueId,
        status: ReplicationStatus,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(ReplicationError::store_msg(
                    "update_queue_record",
                    "simulated update failure",
                ));
            }

            let mut queue = self.queue.write().await;
            let record = queue
                .iter_mut()
                .find(|r| r.queue_id == queue_id && r.status == ReplicationStatus::Pending)
                .ok_or_else(|| {
                    ReplicationError::store_msg(
                        "update_queue_record",
                        format!("no pending queue record with id {}", queue_id),
                    )
                })?;
            record.status = status;
            record.replication_start_time = Some(start_time);
            record.replication_end_time = Some(end_time);
            record.modified_date = Utc::now();
            Ok(())
        })
    }

    fn insert_audit_record<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_audits.load(Ordering::SeqCst) {
                return Err(ReplicationError::store_msg(
                    "insert_audit_record",
                    "simulated audit failure",
                ));
            }
            self.audit.write().await.push(record.clone());
            Ok(())
        })
    }
}
