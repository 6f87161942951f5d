// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the file replicator.
//!
//! This module defines all configuration types needed to run the replicator.
//! Configuration is passed to [`Replicator::new()`](crate::Replicator::new)
//! and can be constructed programmatically or deserialized from JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use file_replication::config::ReplicatorConfig;
//!
//! let mut config = ReplicatorConfig::default();
//! config.watch.path = "/data/outbound".into();
//! config.remote.host = "10.20.0.4".into();
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicatorConfig
//! ├── watch: WatchConfig        # Directory to poll, tick interval, dedup bound
//! ├── regions: RegionConfig     # Labels written into every record
//! ├── remote: RemoteConfig      # SSH target and timeouts
//! ├── retry: RetrySettings      # Attempts and fixed interval
//! ├── store: StoreConfig        # SQLite status store
//! └── secret: SecretConfig      # Base64 private key (never serialized)
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "watch": { "path": "/mnt/replication/outbound", "interval": "10s" },
//!   "regions": { "source": "EastUS2", "target": "CentralUS" },
//!   "remote": { "host": "10.20.0.4", "user": "replicator", "base_path": "/mnt/replication/inbound" },
//!   "retry": { "max_attempts": 3, "interval_sec": 10 },
//!   "store": { "sqlite_path": "/var/lib/replicator/status.db" }
//! }
//! ```

use crate::credentials::SecretString;
use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `Replicator::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Watched directory and tick settings.
    #[serde(default)]
    pub watch: WatchConfig,

    /// Region labels recorded with every queue and audit row.
    #[serde(default)]
    pub regions: RegionConfig,

    /// Remote SSH destination.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Transfer retry policy.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Status store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Private key material. Never serialized.
    #[serde(default, skip_serializing)]
    pub secret: SecretConfig,
}

impl ReplicatorConfig {
    /// Create a minimal config for testing.
    ///
    /// Uses an in-memory store, a fast retry interval and a dummy host.
    pub fn for_testing(watch_path: impl Into<PathBuf>) -> Self {
        Self {
            watch: WatchConfig {
                path: watch_path.into(),
                interval: "50ms".to_string(),
                dedup_high_water_mark: default_dedup_high_water_mark(),
            },
            regions: RegionConfig::default(),
            remote: RemoteConfig {
                host: "replica.test".to_string(),
                ..RemoteConfig::default()
            },
            retry: RetrySettings {
                max_attempts: 3,
                interval_sec: 0,
            },
            store: StoreConfig::in_memory(),
            secret: SecretConfig::default(),
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ReplicationError::Config(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    /// Check the config for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.watch.path.as_os_str().is_empty() {
            return Err(ReplicationError::Config("watch.path is empty".to_string()));
        }
        match humantime::parse_duration(&self.watch.interval) {
            Ok(d) if d.is_zero() => {
                return Err(ReplicationError::Config("watch.interval must be non-zero".to_string()));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ReplicationError::Config(format!(
                    "watch.interval {:?}: {}",
                    self.watch.interval, e
                )));
            }
        }
        for (field, value) in [
            ("remote.connect_timeout", &self.remote.connect_timeout),
            ("remote.operation_timeout", &self.remote.operation_timeout),
        ] {
            let duration = humantime::parse_duration(value)
                .map_err(|e| ReplicationError::Config(format!("{} {:?}: {}", field, value, e)))?;
            if duration.is_zero() {
                return Err(ReplicationError::Config(format!("{} must be non-zero", field)));
            }
        }
        if self.watch.dedup_high_water_mark == 0 {
            return Err(ReplicationError::Config(
                "watch.dedup_high_water_mark must be at least 1".to_string(),
            ));
        }
        if self.remote.host.trim().is_empty() {
            return Err(ReplicationError::Config("remote.host is empty".to_string()));
        }
        if self.remote.user.trim().is_empty() {
            return Err(ReplicationError::Config("remote.user is empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ReplicationError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WatchConfig: discovery settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Watched directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory whose immediate entries are replicated.
    #[serde(default = "default_watch_path")]
    pub path: PathBuf,

    /// Tick interval as a duration string (e.g., "10s").
    #[serde(default = "default_watch_interval")]
    pub interval: String,

    /// The dedup set is cleared once it grows beyond this many keys.
    #[serde(default = "default_dedup_high_water_mark")]
    pub dedup_high_water_mark: usize,
}

fn default_watch_path() -> PathBuf {
    PathBuf::from("/mnt/replication/outbound")
}

fn default_watch_interval() -> String {
    "10s".to_string()
}

fn default_dedup_high_water_mark() -> usize {
    10_000
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: default_watch_path(),
            interval: default_watch_interval(),
            dedup_high_water_mark: default_dedup_high_water_mark(),
        }
    }
}

impl WatchConfig {
    /// Parse the interval string to a Duration.
    pub fn interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.interval).unwrap_or(Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RegionConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Source and target region labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    #[serde(default = "default_source_region")]
    pub source: String,
    #[serde(default = "default_target_region")]
    pub target: String,
}

fn default_source_region() -> String {
    "EastUS2".to_string()
}

fn default_target_region() -> String {
    "CentralUS".to_string()
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            source: default_source_region(),
            target: default_target_region(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteConfig: SSH destination
// ═══════════════════════════════════════════════════════════════════════════════

/// Remote host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Host name or address.
    #[serde(default)]
    pub host: String,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Remote directory; destination = base_path + "/" + file name.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Bound on connect + authenticate (e.g., "5m").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Bound on the upload itself (e.g., "10m").
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: String,

    /// Expected SHA-256 host key fingerprint (base64, as printed by
    /// `ssh-keygen -lf`, with or without the `SHA256:` prefix).
    /// When unset, any host key is accepted.
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "replicator".to_string()
}

fn default_base_path() -> String {
    "/mnt/replication/inbound".to_string()
}

fn default_connect_timeout() -> String {
    "5m".to_string()
}

fn default_operation_timeout() -> String {
    "10m".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: default_user(),
            base_path: default_base_path(),
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            host_key_fingerprint: None,
        }
    }
}

impl RemoteConfig {
    /// Parse connect_timeout, falling back to 5 minutes.
    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(300))
    }

    /// Parse operation_timeout, falling back to 10 minutes.
    pub fn operation_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.operation_timeout).unwrap_or(Duration::from_secs(600))
    }

    /// `user@host:port`, used as the target label in logs and errors.
    pub fn target_label(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetrySettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Transfer retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum transfer attempts per file.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Fixed delay between a failed attempt and the next (seconds).
    #[serde(default = "default_retry_interval_sec")]
    pub interval_sec: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_interval_sec() -> u64 {
    10
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_sec: default_retry_interval_sec(),
        }
    }
}

impl RetrySettings {
    /// Build the retry policy used by the transfer controller.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            interval: Duration::from_secs(self.interval_sec),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Status store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Whether to use WAL mode for SQLite (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_sqlite_path() -> String {
    "replication_status.db".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            wal_mode: true,
        }
    }
}

impl StoreConfig {
    /// Create an in-memory config for testing.
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: ":memory:".to_string(),
            wal_mode: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SecretConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Secret material for the transport.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretConfig {
    /// Base64-encoded private key (PEM or OpenSSH format once decoded).
    #[serde(default)]
    pub private_key_base64: SecretString,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
