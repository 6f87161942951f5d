//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - A scripted Transport that records uploads
//! - An in-memory StatusStore with injectable failures
//! - Watched-directory helpers

#![allow(dead_code)]

pub mod memory_store;
pub mod mock_transport;

pub use memory_store::*;
pub use mock_transport::*;

use file_replication::ReplicatorConfig;
use std::path::Path;
use tempfile::TempDir;

/// A temporary watched directory.
pub struct WatchDir {
    pub dir: TempDir,
}

impl WatchDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file of `size` bytes.
    pub fn add_file(&self, name: &str, size: usize) {
        std::fs::write(self.path().join(name), vec![b'x'; size]).expect("Failed to write file");
    }

    pub fn remove_file(&self, name: &str) {
        std::fs::remove_file(self.path().join(name)).expect("Failed to remove file");
    }

    /// Dedup key of a file in this directory.
    pub fn key(&self, name: &str) -> String {
        self.path().join(name).to_string_lossy().into_owned()
    }

    /// Test config watching this directory with no retry delay.
    pub fn config(&self) -> ReplicatorConfig {
        let mut config = ReplicatorConfig::for_testing(self.path());
        config.remote.base_path = "/mnt/replication/inbound".to_string();
        config
    }
}
