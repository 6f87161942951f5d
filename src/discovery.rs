// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Candidate discovery in the watched directory.

use crate::error::{ReplicationError, Result};
use crate::records::CandidateFile;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::Path;
use tracing::debug;

/// List the regular files directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into. Entries that vanish or cannot be
/// stat'ed between listing and inspection are skipped; failing to open or
/// read the directory itself is a [`ReplicationError::Discovery`].
pub async fn list_candidates(dir: &Path) -> Result<Vec<CandidateFile>> {
    let discovery_error = |source| ReplicationError::Discovery {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(discovery_error)?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(discovery_error)? {
        let path = entry.path();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        candidates.push(CandidateFile {
            path,
            name,
            size_bytes: metadata.len(),
            created_at: creation_time(&metadata),
        });
    }

    candidates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(candidates)
}

/// Birth time, then modification time, then now.
fn creation_time(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
