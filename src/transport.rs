// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport seam and the SSH/SCP implementation.
//!
//! [`Transport`] is the single operation the pipeline needs from the outside
//! world: put one local file at one remote path. [`ScpTransport`] does it
//! over an authenticated `russh` session by running `scp -t` on the remote
//! side and speaking the sink protocol on the channel.
//!
//! # One Attempt
//!
//! ```text
//! decode key (memory only)
//!     │
//!     ▼
//! connect + host key check + publickey auth      ◄── connect_timeout
//!     │
//!     ▼
//! exec "scp -t '<remote path>'"                  ◄── operation_timeout
//!     ├── ack ◄──
//!     ├── "C0644 <size> <name>\n" ──► ack ◄──
//!     ├── <bytes> "\0" ──► ack ◄──
//!     └── eof
//!     │
//!     ▼
//! disconnect
//! ```
//!
//! An existing remote file at the destination is overwritten. Every failure
//! is reported as [`ReplicationError::Transport`] with the `user@host:port`
//! target so the retry controller can log and retry it uniformly.

use crate::config::RemoteConfig;
use crate::credentials::{decode_private_key, SecretString};
use crate::error::{BoxFuture, ReplicationError, Result};
use russh::client;
use russh::{ChannelMsg, Disconnect};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Uploads a single local file to a remote path.
///
/// Implementations must overwrite an existing remote file. One call is one
/// attempt; retries belong to the caller.
pub trait Transport: Send + Sync + 'static {
    /// Upload `local_path` to `remote_path` (a full remote file path).
    fn upload<'a>(&'a self, local_path: &'a Path, remote_path: &'a str) -> BoxFuture<'a, ()>;

    /// Label of the remote endpoint, used in logs and errors.
    fn target(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn upload<'a>(&'a self, local_path: &'a Path, remote_path: &'a str) -> BoxFuture<'a, ()> {
        (**self).upload(local_path, remote_path)
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

// =============================================================================
// SCP over russh
// =============================================================================

/// SSH transport that copies files with the SCP sink protocol.
pub struct ScpTransport {
    remote: RemoteConfig,
    private_key: SecretString,
}

impl ScpTransport {
    pub fn new(remote: RemoteConfig, private_key: SecretString) -> Self {
        if remote.host_key_fingerprint.is_none() {
            warn!(target_host = %remote.host, "No host key fingerprint configured, accepting any server key");
        }
        Self { remote, private_key }
    }

    /// The remote configuration this transport connects with.
    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    async fn upload_once(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let target = self.remote.target_label();
        let fail = |message: String| ReplicationError::transport(target.clone(), message);

        let key_pair = decode_private_key(&self.private_key).map_err(|e| fail(e.to_string()))?;

        // The header size and the streamed bytes both come from this handle.
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| fail(format!("cannot open {}: {}", local_path.display(), e)))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|e| fail(format!("cannot stat {}: {}", local_path.display(), e)))?
            .len();

        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(self.remote.operation_timeout_duration()),
            ..Default::default()
        });
        let handler = HostKeyCheck {
            expected: self
                .remote
                .host_key_fingerprint
                .as_deref()
                .map(normalize_fingerprint),
        };
        let addr = (self.remote.host.as_str(), self.remote.port);
        let connect_timeout = self.remote.connect_timeout_duration();

        let session = tokio::time::timeout(connect_timeout, async {
            let mut session = client::connect(ssh_config, addr, handler)
                .await
                .map_err(|e| fail(format!("SSH connection failed: {}", e)))?;

            let authenticated = session
                .authenticate_publickey(&self.remote.user, Arc::new(key_pair))
                .await
                .map_err(|e| fail(format!("public key auth failed: {}", e)))?;

            if !authenticated {
                return Err(fail("public key rejected by server".to_string()));
            }
            Ok(session)
        })
        .await
        .map_err(|_| fail(format!("connect timed out after {:?}", connect_timeout)))??;

        debug!(remote = %target, "SSH session authenticated");

        let operation_timeout = self.remote.operation_timeout_duration();
        let copied = tokio::time::timeout(
            operation_timeout,
            copy_over_scp(&session, file, file_size, remote_path),
        )
        .await
        .map_err(|_| fail(format!("upload timed out after {:?}", operation_timeout)))
        .and_then(|r| r.map_err(fail));

        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "")
            .await
        {
            debug!(remote = %target, error = %e, "SSH disconnect failed");
        }

        copied
    }
}

impl Transport for ScpTransport {
    fn upload<'a>(&'a self, local_path: &'a Path, remote_path: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(self.upload_once(local_path, remote_path))
    }

    fn target(&self) -> String {
        self.remote.target_label()
    }
}

/// Host key policy: accept anything, or only the configured fingerprint.
struct HostKeyCheck {
    expected: Option<String>,
}

#[async_trait::async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match &self.expected {
            None => Ok(true),
            Some(expected) => {
                let actual = normalize_fingerprint(&server_public_key.fingerprint());
                if &actual == expected {
                    Ok(true)
                } else {
                    warn!(expected = %expected, actual = %actual, "Host key fingerprint mismatch");
                    Ok(false)
                }
            }
        }
    }
}

/// Run one SCP sink exchange on a fresh channel. Errors are plain messages;
/// the caller attaches the target.
async fn copy_over_scp(
    session: &client::Handle<HostKeyCheck>,
    mut file: tokio::fs::File,
    file_size: u64,
    remote_path: &str,
) -> std::result::Result<(), String> {
    let file_name = remote_file_name(remote_path)?;

    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| format!("failed to open SSH channel: {}", e))?;

    channel
        .exec(true, scp_sink_command(remote_path))
        .await
        .map_err(|e| format!("failed to start remote scp: {}", e))?;

    let mut pending = Vec::new();
    await_ack(&mut channel, &mut pending, "session start").await?;

    let header = scp_file_header(file_size, file_name);
    channel
        .data(header.as_bytes())
        .await
        .map_err(|e| format!("failed to send scp header: {}", e))?;
    await_ack(&mut channel, &mut pending, "file header").await?;

    // Exactly the declared size: appended bytes are left out, a shrunken
    // file fails the attempt instead of stalling the sink.
    let mut buf = vec![0u8; SCP_CHUNK_SIZE];
    let mut remaining = file_size;
    while remaining > 0 {
        let n = next_body_chunk(&mut file, &mut buf, remaining).await?;
        channel
            .data(&buf[..n])
            .await
            .map_err(|e| format!("failed to stream file contents: {}", e))?;
        remaining -= n as u64;
    }
    channel
        .data(&[0u8][..])
        .await
        .map_err(|e| format!("failed to finish file contents: {}", e))?;
    await_ack(&mut channel, &mut pending, "file contents").await?;

    channel
        .eof()
        .await
        .map_err(|e| format!("failed to close scp stream: {}", e))?;

    // Drain until the remote side reports its exit status or closes.
    loop {
        match channel.wait().await {
            Some(ChannelMsg::ExitStatus { exit_status }) if exit_status != 0 => {
                return Err(format!("remote scp exited with status {}", exit_status));
            }
            Some(ChannelMsg::ExitStatus { .. }) | Some(ChannelMsg::Close) | None => break,
            Some(ChannelMsg::ExtendedData { data, .. }) => {
                debug!(stderr = %String::from_utf8_lossy(&data), "Remote scp stderr");
            }
            _ => {}
        }
    }

    Ok(())
}

/// Wait for one acknowledgement from the remote `scp -t`.
async fn await_ack(
    channel: &mut russh::Channel<client::Msg>,
    pending: &mut Vec<u8>,
    stage: &str,
) -> std::result::Result<(), String> {
    loop {
        match parse_ack(pending) {
            Ack::Ok(consumed) => {
                pending.drain(..consumed);
                return Ok(());
            }
            Ack::Error(message) => {
                return Err(format!("remote scp rejected {}: {}", stage, message));
            }
            Ack::Incomplete => {}
        }

        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => pending.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, .. }) => {
                debug!(stderr = %String::from_utf8_lossy(&data), "Remote scp stderr");
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                return Err(format!(
                    "remote scp exited with status {} during {}",
                    exit_status, stage
                ));
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                return Err(format!("channel closed while waiting for {} ack", stage));
            }
            _ => {}
        }
    }
}

// =============================================================================
// SCP protocol helpers
// =============================================================================

/// Result of inspecting buffered sink output for an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Need more bytes.
    Incomplete,
    /// Positive ack; number of bytes consumed.
    Ok(usize),
    /// Warning (1) or fatal (2) reply with its message.
    Error(String),
}

/// Parse an SCP acknowledgement: `\0` is success, `\x01` / `\x02` are
/// followed by a message line.
pub fn parse_ack(buf: &[u8]) -> Ack {
    match buf.first() {
        None => Ack::Incomplete,
        Some(0) => Ack::Ok(1),
        Some(1) | Some(2) => match buf.iter().position(|&b| b == b'\n') {
            Some(end) => Ack::Error(String::from_utf8_lossy(&buf[1..end]).trim().to_string()),
            None => Ack::Incomplete,
        },
        Some(other) => Ack::Error(format!("unexpected reply byte 0x{:02x}", other)),
    }
}

/// Bytes read from the local file per channel write.
const SCP_CHUNK_SIZE: usize = 32 * 1024;

/// Read the next piece of a body that must supply exactly `remaining` more
/// bytes. Never reads past `remaining`; hitting EOF first is an error.
async fn next_body_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    remaining: u64,
) -> std::result::Result<usize, String> {
    let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
    let n = reader
        .read(&mut buf[..want])
        .await
        .map_err(|e| format!("failed to read local file: {}", e))?;
    if n == 0 && want > 0 {
        return Err(format!(
            "local file shrank during transfer, {} byte(s) short of the declared size",
            remaining
        ));
    }
    Ok(n)
}

/// `C0644 <size> <name>\n`
pub(crate) fn scp_file_header(size: u64, name: &str) -> String {
    format!("C0644 {} {}\n", size, name)
}

/// `scp -t '<path>'` with the path single-quoted for the remote shell.
pub fn scp_sink_command(remote_path: &str) -> String {
    format!("scp -t {}", shell_quote(remote_path))
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn remote_file_name(remote_path: &str) -> std::result::Result<&str, String> {
    match remote_path.rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains('\n') => Ok(name),
        _ => Err(format!("invalid remote path: {:?}", remote_path)),
    }
}

/// Compare fingerprints without the `SHA256:` prefix or base64 padding.
fn normalize_fingerprint(value: &str) -> String {
    let value = value.trim();
    let value = value.strip_prefix("SHA256:").unwrap_or(value);
    value.trim_end_matches('=').to_string()
}
