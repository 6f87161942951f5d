// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `file-replicator`: polls a directory and replicates new files over SSH.
//!
//! Every setting can come from a JSON config file (`--config`), an
//! environment variable or a flag; flags and environment variables override
//! the file.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use file_replication::{
    Replicator, ReplicatorConfig, ScpTransport, SecretString, SqliteStatusStore,
};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "file-replicator", version, about = "Replicate newly arrived files to a remote host over SSH")]
struct Args {
    /// JSON config file used as the base configuration
    #[arg(long, env = "REPLICATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to watch
    #[arg(long, env = "WATCH_PATH")]
    watch_path: Option<PathBuf>,

    /// Tick interval (e.g. "10s")
    #[arg(long, env = "WATCH_INTERVAL")]
    interval: Option<String>,

    /// Dedup set size that triggers a reset
    #[arg(long, env = "DEDUP_HIGH_WATER_MARK")]
    dedup_high_water_mark: Option<usize>,

    #[arg(long, env = "SOURCE_REGION")]
    source_region: Option<String>,

    #[arg(long, env = "TARGET_REGION")]
    target_region: Option<String>,

    /// Remote SSH host
    #[arg(long, env = "TARGET_HOST")]
    target_host: Option<String>,

    #[arg(long, env = "TARGET_PORT")]
    target_port: Option<u16>,

    #[arg(long, env = "TARGET_USER")]
    target_user: Option<String>,

    /// Remote directory files are written into
    #[arg(long, env = "TARGET_BASE_PATH")]
    target_base_path: Option<String>,

    /// Expected SHA-256 host key fingerprint
    #[arg(long, env = "TARGET_HOST_KEY_FINGERPRINT")]
    host_key_fingerprint: Option<String>,

    #[arg(long, env = "CONNECT_TIMEOUT")]
    connect_timeout: Option<String>,

    #[arg(long, env = "OPERATION_TIMEOUT")]
    operation_timeout: Option<String>,

    #[arg(long, env = "RETRY_MAX_ATTEMPTS")]
    max_attempts: Option<usize>,

    #[arg(long, env = "RETRY_INTERVAL_SEC")]
    retry_interval_sec: Option<u64>,

    /// SQLite status database path
    #[arg(long, env = "STATUS_DB_PATH")]
    sqlite_path: Option<String>,

    /// Base64-encoded private key
    #[arg(long, env = "SSH_PRIVATE_KEY_BASE64", hide_env_values = true)]
    private_key_base64: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> Result<ReplicatorConfig> {
        let mut config = match &self.config {
            Some(path) => ReplicatorConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ReplicatorConfig::default(),
        };

        if let Some(v) = self.watch_path {
            config.watch.path = v;
        }
        if let Some(v) = self.interval {
            config.watch.interval = v;
        }
        if let Some(v) = self.dedup_high_water_mark {
            config.watch.dedup_high_water_mark = v;
        }
        if let Some(v) = self.source_region {
            config.regions.source = v;
        }
        if let Some(v) = self.target_region {
            config.regions.target = v;
        }
        if let Some(v) = self.target_host {
            config.remote.host = v;
        }
        if let Some(v) = self.target_port {
            config.remote.port = v;
        }
        if let Some(v) = self.target_user {
            config.remote.user = v;
        }
        if let Some(v) = self.target_base_path {
            config.remote.base_path = v;
        }
        if let Some(v) = self.host_key_fingerprint {
            config.remote.host_key_fingerprint = Some(v);
        }
        if let Some(v) = self.connect_timeout {
            config.remote.connect_timeout = v;
        }
        if let Some(v) = self.operation_timeout {
            config.remote.operation_timeout = v;
        }
        if let Some(v) = self.max_attempts {
            config.retry.max_attempts = v;
        }
        if let Some(v) = self.retry_interval_sec {
            config.retry.interval_sec = v;
        }
        if let Some(v) = self.sqlite_path {
            config.store.sqlite_path = v;
        }
        if let Some(v) = self.private_key_base64 {
            config.secret.private_key_base64 = SecretString::from(v);
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.into_config()?;
    if config.secret.private_key_base64.is_empty() {
        tracing::warn!("No private key configured; every transfer will fail until one is provided");
    }

    let store = SqliteStatusStore::new(&config.store)
        .await
        .context("opening status store")?;
    let transport = ScpTransport::new(
        config.remote.clone(),
        config.secret.private_key_base64.clone(),
    );
    let replicator = Replicator::new(config, transport, store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            // Dropping the sender would stop the replicator
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl-C received, finishing current tick");
        let _ = shutdown_tx.send(true);
    });

    replicator.run(shutdown_rx).await?;
    replicator.store().close().await;
    Ok(())
}
