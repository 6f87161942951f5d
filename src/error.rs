// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the file replication pipeline.
//!
//! Errors are categorized by the stage of the pipeline that produced them
//! (discovery, transport, status store, ...) and carry enough context to be
//! logged meaningfully on their own.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes | One upload attempt failed (auth, connect, timeout, I/O) |
//! | `Credential` | Yes | Key material could not be decoded for an attempt |
//! | `Store` | No | Status store write/read failed (logged, never retried by the pipeline) |
//! | `RetriesExhausted` | No | Every transfer attempt for a file failed |
//! | `Discovery` | No | Watched directory missing or unlistable (next tick retries) |
//! | `Config` | No | Configuration invalid |
//! | `InvalidState` | No | Lifecycle misuse |
//! | `Shutdown` | No | Replicator is shutting down |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! [`ReplicationError::is_retryable()`] is what the retry controller consults
//! between attempts. Only single-attempt transport failures are worth another
//! attempt; everything else is either terminal for the file or terminal for
//! the tick.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Type alias for boxed async futures (keeps the trait seams object-safe).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Errors that can occur while replicating files.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Watched location is missing or cannot be listed.
    ///
    /// The tick aborts without writing anything; the next tick starts
    /// discovery from scratch.
    #[error("Discovery error ({}): {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single transport attempt failed.
    ///
    /// `target` is the remote endpoint (`user@host:port`).
    #[error("Transport error ({target}): {message}")]
    Transport { target: String, message: String },

    /// Private key material could not be decoded.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Every transfer attempt for a file failed.
    ///
    /// Only the last attempt's error is kept; earlier ones are logged.
    #[error("Transfer of {file} failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        file: String,
        attempts: usize,
        last_error: Box<ReplicationError>,
    },

    /// Status store write or read failed.
    #[error("Status store error ({operation}): {message}")]
    Store {
        operation: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lifecycle state violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown in progress.
    #[error("Shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a store error from a sqlx::Error
    pub fn store(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Store {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a store error without source
    pub fn store_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error for the given target.
    pub fn transport(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Credential(_) => true, // Secret may be rotated between attempts
            Self::RetriesExhausted { .. } => false,
            Self::Store { .. } => false,
            Self::Discovery { .. } => false,
            Self::Config(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Message of the error that actually ended a transfer sequence.
    ///
    /// For [`RetriesExhausted`](Self::RetriesExhausted) this is the last
    /// attempt's error; for anything else it is the error itself.
    pub fn final_message(&self) -> String {
        match self {
            Self::RetriesExhausted { last_error, .. } => last_error.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for ReplicationError {
    fn from(e: sqlx::Error) -> Self {
        Self::store("unknown", e)
    }
}
