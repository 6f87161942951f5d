//! Mock Transport for testing.
//!
//! Records every upload() call and fails according to a script:
//! the first N calls, every call for given file names, or everything.

use file_replication::{BoxFuture, ReplicationError, Transport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

pub const MOCK_TARGET: &str = "replicator@replica.test:22";

/// A recorded upload() call.
#[derive(Debug, Clone)]
pub struct UploadCall {
    pub local_path: PathBuf,
    pub remote_path: String,
    /// 1-based call number across all files
    pub call: usize,
    pub succeeded: bool,
}

impl UploadCall {
    pub fn file_name(&self) -> &str {
        self.remote_path.rsplit('/').next().unwrap_or(&self.remote_path)
    }
}

/// Scripted implementation of [`Transport`].
///
/// # Example
/// ```rust,ignore
/// let transport = MockTransport::new();
/// transport.fail_first(2);            // attempts 1 and 2 fail
/// transport.fail_file("b.txt").await; // b.txt never succeeds
/// ```
pub struct MockTransport {
    calls: RwLock<Vec<UploadCall>>,
    call_count: AtomicUsize,
    fail_first: AtomicUsize,
    fail_always: AtomicBool,
    failing_files: RwLock<HashSet<String>>,
    delay: Duration,
}

impl MockTransport {
    /// A transport where every upload succeeds.
    pub fn new() -> Self {
        Self {
            calls: RwLock::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
            fail_always: AtomicBool::new(false),
            failing_files: RwLock::new(HashSet::new()),
            delay: Duration::ZERO,
        }
    }

    /// A transport where every upload fails.
    pub fn failing() -> Self {
        let transport = Self::new();
        transport.fail_always.store(true, Ordering::SeqCst);
        transport
    }

    /// Each upload takes `delay` before completing.
    #[allow(dead_code)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the first `n` calls (across all files).
    pub fn fail_first(&self, n: usize) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    /// Always fail uploads of `name`.
    #[allow(dead_code)]
    pub async fn fail_file(&self, name: &str) {
        self.failing_files.write().await.insert(name.to_string());
    }

    /// All recorded calls, in order.
    pub async fn calls(&self) -> Vec<UploadCall> {
        self.calls.read().await.clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Calls made for a given file name.
    #[allow(dead_code)]
    pub async fn calls_for(&self, name: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.file_name() == name)
            .count()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn upload<'a>(&'a self, local_path: &'a Path, remote_path: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
            let fail = self.fail_always.load(Ordering::SeqCst)
                || call <= self.fail_first.load(Ordering::SeqCst)
                || self.failing_files.read().await.contains(name);

            self.calls.write().await.push(UploadCall {
                local_path: local_path.to_path_buf(),
                remote_path: remote_path.to_string(),
                call,
                succeeded: !fail,
            });

            if fail {
                Err(ReplicationError::transport(
                    MOCK_TARGET,
                    format!("simulated failure on call {call} for {name}"),
                ))
            } else {
                Ok(())
            }
        })
    }

    fn target(&self) -> String {
        MOCK_TARGET.to_string()
    }
}
