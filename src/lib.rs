// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # File Replication
//!
//! Watches a local directory and replicates each newly arrived file exactly
//! once to a remote host over SSH, recording every outcome in a durable
//! status store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            file-replication                              │
//! │                                                                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────────┐  │
//! │  │ list_        │──►│ DedupTracker │──►│ Replicator::replicate        │  │
//! │  │ candidates   │   │ (seen paths) │   │ Pending → transfer → status  │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────────────┘  │
//! │                                              │                 │         │
//! │                                              ▼                 ▼         │
//! │                               ┌──────────────────┐  ┌──────────────────┐ │
//! │                               │ RetryingTransfer │  │ StatusStore      │ │
//! │                               │  └ ScpTransport  │  │ (queue + audit)  │ │
//! │                               └──────────────────┘  └──────────────────┘ │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use file_replication::{Replicator, ReplicatorConfig, ScpTransport, SqliteStatusStore};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> file_replication::Result<()> {
//!     let config = ReplicatorConfig::from_json_file("replicator.json")?;
//!     config.validate()?;
//!
//!     let store = SqliteStatusStore::new(&config.store).await?;
//!     let transport = ScpTransport::new(
//!         config.remote.clone(),
//!         config.secret.private_key_base64.clone(),
//!     );
//!     let replicator = Replicator::new(config, transport, store);
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     replicator.run(shutdown_rx).await?;
//!     replicator.store().close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod records;
pub mod resilience;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use config::{RegionConfig, RemoteConfig, ReplicatorConfig, RetrySettings, StoreConfig, WatchConfig};
pub use coordinator::{EngineState, ReplicationReport, Replicator, TickReport};
pub use credentials::SecretString;
pub use dedup::DedupTracker;
pub use error::{BoxFuture, ReplicationError, Result};
pub use records::{AuditEntry, AuditRecord, CandidateFile, NewQueueRecord, QueueId, QueueRecord, ReplicationStatus};
pub use resilience::{RetryConfig, RetryingTransfer, TransferFailure, TransferReport};
pub use store::{SqliteStatusStore, StatusStore};
pub use transport::{ScpTransport, Transport};
