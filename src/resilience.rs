// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience utilities: bounded retry around the transport.
//!
//! - [`RetryConfig`]: attempt bound and fixed delay between attempts
//! - [`RetryingTransfer`]: drives a [`Transport`] until it succeeds or the
//!   attempts run out
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example<T: file_replication::Transport>(transport: T) -> file_replication::Result<()> {
//! use file_replication::resilience::{RetryConfig, RetryingTransfer};
//! use std::path::Path;
//!
//! let transfer = RetryingTransfer::new(transport, RetryConfig::default(), "/mnt/replication/inbound");
//! let report = transfer.send(Path::new("/mnt/replication/outbound/a.txt"), "a.txt").await?;
//! assert!(report.attempts >= 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::transport::Transport;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for transfer retry behavior.
///
/// The delay is fixed; there is no backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of transfer attempts (including the first).
    pub max_attempts: usize,

    /// Delay between a failed attempt and the next one.
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_millis(10),
        }
    }

    /// Single attempt, no retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    ///
    /// ```text
    /// attempt 1 ─ interval ─ attempt 2 ─ interval ─ attempt 3   (no trailing sleep)
    /// ```
    pub fn total_delay(&self) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(1) as u32)
    }
}

/// Outcome of a successful transfer sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Attempts used, including the successful one.
    pub attempts: usize,
    /// Full remote destination path.
    pub remote_path: String,
}

/// Outcome of a transfer sequence where every attempt failed.
#[derive(Debug)]
pub struct TransferFailure {
    /// Attempts made, all failed.
    pub attempts: usize,
    /// Error returned by the final attempt.
    pub last_error: ReplicationError,
}

impl TransferFailure {
    /// Wrap into [`ReplicationError::RetriesExhausted`] for `file`.
    pub fn into_error(self, file: impl Into<String>) -> ReplicationError {
        ReplicationError::RetriesExhausted {
            file: file.into(),
            attempts: self.attempts,
            last_error: Box::new(self.last_error),
        }
    }
}

/// Join the remote base path and a file name with exactly one `/`.
pub fn remote_destination(base_path: &str, remote_name: &str) -> String {
    let base = base_path.trim_end_matches('/');
    format!("{}/{}", base, remote_name)
}

/// Retry controller wrapping a [`Transport`].
pub struct RetryingTransfer<T: Transport> {
    transport: T,
    config: RetryConfig,
    base_path: String,
}

impl<T: Transport> RetryingTransfer<T> {
    pub fn new(transport: T, config: RetryConfig, base_path: impl Into<String>) -> Self {
        Self {
            transport,
            config,
            base_path: base_path.into(),
        }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Get the wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload `local_path` to `<base_path>/<remote_name>`, retrying failed attempts.
    ///
    /// Returns [`ReplicationError::RetriesExhausted`] carrying the last
    /// attempt's error once every attempt has failed. Any error a transport
    /// returns counts as a failed attempt.
    pub async fn send(&self, local_path: &Path, remote_name: &str) -> Result<TransferReport> {
        self.send_attempts(local_path, remote_name)
            .await
            .map_err(|failure| failure.into_error(remote_name))
    }

    /// Same as [`send`](Self::send), but the failure keeps the attempt
    /// count next to the final error.
    pub async fn send_attempts(
        &self,
        local_path: &Path,
        remote_name: &str,
    ) -> std::result::Result<TransferReport, TransferFailure> {
        let remote_path = remote_destination(&self.base_path, remote_name);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let started = Instant::now();

            debug!(
                file = %remote_name,
                remote = %self.transport.target(),
                attempt,
                max_attempts,
                "Starting transfer attempt"
            );

            match self.transport.upload(local_path, &remote_path).await {
                Ok(()) => {
                    metrics::record_transfer_attempt("success", started.elapsed());
                    info!(
                        file = %remote_name,
                        remote_path = %remote_path,
                        attempt,
                        "File transferred"
                    );
                    return Ok(TransferReport {
                        attempts: attempt,
                        remote_path,
                    });
                }
                Err(e) => {
                    metrics::record_transfer_attempt("failure", started.elapsed());
                    warn!(
                        file = %remote_name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transfer attempt failed"
                    );

                    if attempt >= max_attempts {
                        return Err(TransferFailure {
                            attempts: attempt,
                            last_error: e,
                        });
                    }

                    if !self.config.interval.is_zero() {
                        tokio::time::sleep(self.config.interval).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `fail_first` calls, then succeeds.
    struct ScriptedTransport {
        fail_first: usize,
        calls: AtomicUsize,
        paths: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(fail_first: usize) -> Self {
            Self {
                fail_first,
                calls: AtomicUsize::new(0),
                paths: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn upload<'a>(&'a self, _local_path: &'a Path, remote_path: &'a str) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                self.paths.lock().unwrap().push(remote_path.to_string());
                if n <= self.fail_first {
                    Err(ReplicationError::transport("test@host:22", format!("attempt {n} refused")))
                } else {
                    Ok(())
                }
            })
        }

        fn target(&self) -> String {
            "test@host:22".to_string()
        }
    }

    /// Always fails with an error outside the transport category.
    struct InternalFailureTransport {
        calls: AtomicUsize,
    }

    impl Transport for InternalFailureTransport {
        fn upload<'a>(&'a self, _local_path: &'a Path, _remote_path: &'a str) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(ReplicationError::Internal(format!("unexpected state on attempt {n}")))
            })
        }

        fn target(&self) -> String {
            "test@host:22".to_string()
        }
    }

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_retry_config_presets() {
        assert_eq!(RetryConfig::testing().max_attempts, 3);
        assert_eq!(RetryConfig::testing().interval, Duration::from_millis(10));
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_total_delay_has_no_trailing_sleep() {
        assert_eq!(RetryConfig::default().total_delay(), Duration::from_secs(20));
        assert_eq!(RetryConfig::no_retry().total_delay(), Duration::ZERO);
    }

    #[test]
    fn test_remote_destination_joining() {
        assert_eq!(remote_destination("/mnt/in", "a.txt"), "/mnt/in/a.txt");
        assert_eq!(remote_destination("/mnt/in/", "a.txt"), "/mnt/in/a.txt");
        assert_eq!(remote_destination("", "a.txt"), "/a.txt");
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let transfer = RetryingTransfer::new(ScriptedTransport::new(0), fast(3), "/mnt/in");
        let report = transfer.send(Path::new("/tmp/a.txt"), "a.txt").await.unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.remote_path, "/mnt/in/a.txt");
        assert_eq!(transfer.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let transfer = RetryingTransfer::new(ScriptedTransport::new(2), fast(3), "/mnt/in");
        let report = transfer.send(Path::new("/tmp/a.txt"), "a.txt").await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(transfer.transport().calls.load(Ordering::SeqCst), 3);
        let paths = transfer.transport().paths.lock().unwrap().clone();
        assert!(paths.iter().all(|p| p == "/mnt/in/a.txt"));
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_error() {
        let transfer = RetryingTransfer::new(ScriptedTransport::new(usize::MAX), fast(3), "/mnt/in");
        let err = transfer.send(Path::new("/tmp/a.txt"), "a.txt").await.unwrap_err();

        assert_eq!(transfer.transport().calls.load(Ordering::SeqCst), 3);
        match &err {
            ReplicationError::RetriesExhausted { file, attempts, last_error } => {
                assert_eq!(file, "a.txt");
                assert_eq!(*attempts, 3);
                assert!(last_error.to_string().contains("attempt 3 refused"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(err.final_message().contains("attempt 3 refused"));
    }

    #[tokio::test]
    async fn test_non_transport_errors_use_every_attempt() {
        let transport = InternalFailureTransport {
            calls: AtomicUsize::new(0),
        };
        let transfer = RetryingTransfer::new(transport, fast(3), "/mnt/in");
        let err = transfer.send(Path::new("/tmp/a.txt"), "a.txt").await.unwrap_err();

        assert_eq!(transfer.transport().calls.load(Ordering::SeqCst), 3);
        match &err {
            ReplicationError::RetriesExhausted { attempts, last_error, .. } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last_error, ReplicationError::Internal(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(err.final_message().contains("attempt 3"));
    }

    #[tokio::test]
    async fn test_send_attempts_carries_count() {
        let transfer = RetryingTransfer::new(ScriptedTransport::new(usize::MAX), fast(2), "/mnt/in");
        let failure = transfer
            .send_attempts(Path::new("/tmp/a.txt"), "a.txt")
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 2);
        assert!(failure.last_error.to_string().contains("attempt 2 refused"));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let transfer = RetryingTransfer::new(ScriptedTransport::new(usize::MAX), fast(0), "/mnt/in");
        let err = transfer.send(Path::new("/tmp/a.txt"), "a.txt").await.unwrap_err();
        assert!(matches!(err, ReplicationError::RetriesExhausted { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_between_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            interval: Duration::from_secs(10),
        };
        let transfer = RetryingTransfer::new(ScriptedTransport::new(usize::MAX), config, "/mnt/in");

        let start = tokio::time::Instant::now();
        let _ = transfer.send(Path::new("/tmp/a.txt"), "a.txt").await;
        let elapsed = start.elapsed();

        // Two sleeps between three attempts, none after the last
        assert_eq!(elapsed, Duration::from_secs(20));
    }
}
