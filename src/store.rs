// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable status store for queue and audit records.
//!
//! [`StatusStore`] is the gateway the pipeline writes through. It has three
//! independent writes and no business logic:
//!
//! ```text
//! insert_queue_record (Pending) ──► queue_id
//! update_queue_record (queue_id, Completed | Failed, start, end)
//! insert_audit_record (terminal outcome)
//! ```
//!
//! Nothing is transactional across the three calls. A crash between the
//! update and the audit insert leaves a terminal queue row without its audit
//! row; operators can find those by joining on file name and status.
//!
//! # SQLite Busy Handling
//!
//! SQLite can return SQLITE_BUSY/SQLITE_LOCKED when the database is
//! contended (e.g. an operator querying it). Every statement is retried with
//! capped exponential backoff before the error surfaces. This is purely a
//! storage-level retry; a transfer is never repeated because of it.

use crate::config::StoreConfig;
use crate::error::{BoxFuture, ReplicationError, Result};
use crate::records::{AuditEntry, AuditRecord, NewQueueRecord, QueueId, QueueRecord, ReplicationStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for SQLite busy retry behavior
const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

/// Persistence gateway for replication status.
///
/// Each method is a single write that either fully happens or returns
/// [`ReplicationError::Store`].
pub trait StatusStore: Send + Sync + 'static {
    /// Insert a new queue record and return its store-assigned id.
    fn insert_queue_record<'a>(&'a self, record: &'a NewQueueRecord) -> BoxFuture<'a, QueueId>;

    /// Move a Pending queue record to its terminal status.
    ///
    /// Also sets `modified_date`. Unknown ids are an error.
    fn update_queue_record(
        &self,
        queue_id: QueueId,
        status: ReplicationStatus,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, ()>;

    /// Append an audit record.
    fn insert_audit_record<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, ()>;
}

impl<S: StatusStore + ?Sized> StatusStore for Arc<S> {
    fn insert_queue_record<'a>(&'a self, record: &'a NewQueueRecord) -> BoxFuture<'a, QueueId> {
        (**self).insert_queue_record(record)
    }

    fn update_queue_record(
        &self,
        queue_id: QueueId,
        status: ReplicationStatus,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, ()> {
        (**self).update_queue_record(queue_id, status, start_time, end_time)
    }

    fn insert_audit_record<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, ()> {
        (**self).insert_audit_record(record)
    }
}

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLite error codes: SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(
    operation_name: &str,
    mut f: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts,
                        "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::store_busy_retry(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(
                        operation = operation_name,
                        attempts,
                        "SQLite busy, max retries exceeded"
                    );
                }
                return Err(e);
            }
        }
    }
}

const CREATE_QUEUE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS file_replication_queue (
        queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        source_region TEXT NOT NULL,
        target_region TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('Pending', 'Completed', 'Failed')),
        upload_time TEXT NOT NULL,
        replication_start_time TEXT,
        replication_end_time TEXT,
        created_date TEXT NOT NULL,
        modified_date TEXT NOT NULL
    )
"#;

const CREATE_AUDIT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS file_replication_audit (
        audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('Pending', 'Completed', 'Failed')),
        source_region TEXT NOT NULL,
        target_region TEXT NOT NULL,
        upload_time TEXT NOT NULL,
        replication_time TEXT NOT NULL,
        replication_duration_ms INTEGER NOT NULL,
        error_message TEXT,
        created_date TEXT NOT NULL
    )
"#;

/// Status store backed by SQLite.
pub struct SqliteStatusStore {
    pool: SqlitePool,
    path: String,
}

impl SqliteStatusStore {
    /// Open (or create) the store described by `config`.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let path = config.sqlite_path.clone();
        info!(path = %path, wal = config.wal_mode, "Initializing status store");

        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };

        let journal_mode = if config.wal_mode && !in_memory {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?
            .journal_mode(journal_mode)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = if in_memory {
            // Each in-memory connection is its own database; keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await
        }
        .map_err(|e| ReplicationError::store("open", e))?;

        for ddl in [CREATE_QUEUE_TABLE, CREATE_AUDIT_TABLE] {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| ReplicationError::store("create_schema", e))?;
        }

        Ok(Self { pool, path })
    }

    /// Open a file-backed store at `path` with WAL enabled.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::new(&StoreConfig {
            sqlite_path: path.as_ref().to_string_lossy().to_string(),
            wal_mode: true,
        })
        .await
    }

    /// Open a private in-memory store.
    pub async fn in_memory() -> Result<Self> {
        Self::new(&StoreConfig::in_memory()).await
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetch a single queue record.
    pub async fn queue_record(&self, queue_id: QueueId) -> Result<Option<QueueRecord>> {
        let row = sqlx::query("SELECT * FROM file_replication_queue WHERE queue_id = ?")
            .bind(queue_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ReplicationError::store("queue_record", e))?;

        row.as_ref().map(queue_record_from_row).transpose()
    }

    /// All queue records in insertion order.
    pub async fn queue_records(&self) -> Result<Vec<QueueRecord>> {
        let rows = sqlx::query("SELECT * FROM file_replication_queue ORDER BY queue_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ReplicationError::store("queue_records", e))?;

        rows.iter().map(queue_record_from_row).collect()
    }

    /// All audit records in insertion order.
    pub async fn audit_records(&self) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM file_replication_audit ORDER BY audit_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ReplicationError::store("audit_records", e))?;

        rows.iter().map(audit_entry_from_row).collect()
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;

        execute_with_retry("checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                .execute(pool)
                .await
        })
        .await
        .map_err(|e| ReplicationError::store("checkpoint", e))?;

        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint WAL and close the connection pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!("Status store closed");
    }
}

impl StatusStore for SqliteStatusStore {
    fn insert_queue_record<'a>(&'a self, record: &'a NewQueueRecord) -> BoxFuture<'a, QueueId> {
        Box::pin(async move {
            let pool = &self.pool;
            let now = Utc::now();

            let result = execute_with_retry("insert_queue_record", || async {
                sqlx::query(
                    r#"
                    INSERT INTO file_replication_queue (
                        file_name, file_size, source_region, target_region, status,
                        upload_time, created_date, modified_date
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.file_name)
                .bind(record.file_size)
                .bind(&record.source_region)
                .bind(&record.target_region)
                .bind(record.status.as_str())
                .bind(record.upload_time)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
            })
            .await
            .map_err(|e| ReplicationError::store("insert_queue_record", e))?;

            let queue_id = QueueId(result.last_insert_rowid());
            debug!(queue_id = %queue_id, file = %record.file_name, "Queue record inserted");
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
            if !status.is_terminal() {
                return Err(ReplicationError::store_msg(
                    "update_queue_record",
                    format!("queue record {} cannot move to {}", queue_id, status),
                ));
            }

            let pool = &self.pool;
            let now = Utc::now();

            let result = execute_with_retry("update_queue_record", || async {
                sqlx::query(
                    r#"
                    UPDATE file_replication_queue
                    SET status = ?,
                        replication_start_time = ?,
                        replication_end_time = ?,
                        modified_date = ?
                    WHERE queue_id = ? AND status = 'Pending'
                    "#,
                )
                .bind(status.as_str())
                .bind(start_time)
                .bind(end_time)
                .bind(now)
                .bind(queue_id.0)
                .execute(pool)
                .await
            })
            .await
            .map_err(|e| ReplicationError::store("update_queue_record", e))?;

            if result.rows_affected() == 0 {
                return Err(ReplicationError::store_msg(
                    "update_queue_record",
                    format!("no pending queue record with id {}", queue_id),
                ));
            }

            debug!(queue_id = %queue_id, status = %status, "Queue record updated");
            Ok(())
        })
    }

    fn insert_audit_record<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let pool = &self.pool;
            let now = Utc::now();

            execute_with_retry("insert_audit_record", || async {
                sqlx::query(
                    r#"
                    INSERT INTO file_replication_audit (
                        file_name, file_size, status, source_region, target_region,
                        upload_time, replication_time, replication_duration_ms,
                        error_message, created_date
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.file_name)
                .bind(record.file_size)
                .bind(record.status.as_str())
                .bind(&record.source_region)
                .bind(&record.target_region)
                .bind(record.upload_time)
                .bind(record.replication_time)
                .bind(record.replication_duration_ms)
                .bind(record.error_message.as_deref())
                .bind(now)
                .execute(pool)
                .await
            })
            .await
            .map_err(|e| ReplicationError::store("insert_audit_record", e))?;

            debug!(file = %record.file_name, status = %record.status, "Audit record inserted");
            Ok(())
        })
    }
}

fn parse_status(operation: &str, raw: String) -> Result<ReplicationStatus> {
    raw.parse()
        .map_err(|e: String| ReplicationError::store_msg(operation, e))
}

fn queue_record_from_row(row: &SqliteRow) -> Result<QueueRecord> {
    let map = |e: sqlx::Error| ReplicationError::store("read_queue_record", e);
    Ok(QueueRecord {
        queue_id: QueueId(row.try_get("queue_id").map_err(map)?),
        file_name: row.try_get("file_name").map_err(map)?,
        file_size: row.try_get("file_size").map_err(map)?,
        source_region: row.try_get("source_region").map_err(map)?,
        target_region: row.try_get("target_region").map_err(map)?,
        status: parse_status("read_queue_record", row.try_get("status").map_err(map)?)?,
        upload_time: row.try_get("upload_time").map_err(map)?,
        replication_start_time: row.try_get("replication_start_time").map_err(map)?,
        replication_end_time: row.try_get("replication_end_time").map_err(map)?,
        created_date: row.try_get("created_date").map_err(map)?,
        modified_date: row.try_get("modified_date").map_err(map)?,
    })
}

fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry> {
    let map = |e: sqlx::Error| ReplicationError::store("read_audit_record", e);
    Ok(AuditEntry {
        audit_id: row.try_get("audit_id").map_err(map)?,
        record: AuditRecord {
            file_name: row.try_get("file_name").map_err(map)?,
            file_size: row.try_get("file_size").map_err(map)?,
            status: parse_status("read_audit_record", row.try_get("status").map_err(map)?)?,
            source_region: row.try_get("source_region").map_err(map)?,
            target_region: row.try_get("target_region").map_err(map)?,
            upload_time: row.try_get("upload_time").map_err(map)?,
            replication_time: row.try_get("replication_time").map_err(map)?,
            replication_duration_ms: row.try_get("replication_duration_ms").map_err(map)?,
            error_message: row.try_get("error_message").map_err(map)?,
        },
        created_date: row.try_get("created_date").map_err(map)?,
    })
}
