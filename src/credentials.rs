// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Private key handling for the SSH transport.
//!
//! The key arrives base64-encoded (from the environment or the config file)
//! and is kept in a [`SecretString`] that is redacted from `Debug` output and
//! zeroed on drop.
//!
//! Each transfer attempt decodes it again with [`decode_private_key`]. The
//! decoded PEM text only ever lives in a [`Zeroizing`] buffer on the heap;
//! nothing is written to local storage, so there is no temporary key file to
//! clean up on any exit path.

use crate::error::{ReplicationError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use russh_keys::key::KeyPair;
use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// A string holding secret material.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when no secret was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("SecretString(<empty>)")
        } else {
            f.write_str("SecretString([REDACTED])")
        }
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Decode the base64-encoded private key into a key pair for one attempt.
///
/// Whitespace and line breaks inside the encoded value are ignored, since
/// secret stores frequently wrap long values.
pub fn decode_private_key(encoded: &SecretString) -> Result<KeyPair> {
    if encoded.is_empty() {
        return Err(ReplicationError::Credential(
            "no private key configured".to_string(),
        ));
    }

    let compact: Zeroizing<String> = Zeroizing::new(
        encoded
            .expose()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect(),
    );

    let decoded: Zeroizing<Vec<u8>> = Zeroizing::new(STANDARD.decode(compact.as_bytes()).map_err(
        |e| ReplicationError::Credential(format!("private key is not valid base64: {e}")),
    )?);

    let pem = std::str::from_utf8(&decoded).map_err(|e| {
        ReplicationError::Credential(format!("decoded private key is not UTF-8: {e}"))
    })?;

    russh_keys::decode_secret_key(pem, None)
        .map_err(|e| ReplicationError::Credential(format!("failed to parse private key: {e}")))
}
