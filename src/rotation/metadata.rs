// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reading the version markers a provider leaves under `<targetPath>/.metadata/`

use crate::constants::METADATA_DIR;
use crate::error::{Result, RotationError};
use crate::types::SecretObjectVersion;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// One record per regular file: file name is the object name, content the version.
/// A missing or empty metadata directory is a provider contract violation.
#[instrument(skip(target_path), fields(target_path = %target_path.display()))]
pub async fn read_versions(target_path: &Path) -> Result<Vec<SecretObjectVersion>> {
    let dir = target_path.join(METADATA_DIR);

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RotationError::NoMetadataWritten(dir));
        }
        Err(e) => return Err(read_error(&dir, e)),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| read_error(&dir, e))? {
        let path = entry.path();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| read_error(&path, e))?;
        if !metadata.is_file() {
            debug!("Ignoring non-file entry {}", path.display());
            continue;
        }

        let object_name = entry.file_name().into_string().map_err(|_| RotationError::MetadataRead {
            path: path.clone(),
            message: "file name is not valid UTF-8".to_string(),
        })?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| read_error(&path, e))?;
        let content = String::from_utf8(bytes).map_err(|_| RotationError::MetadataRead {
            path: path.clone(),
            message: "content is not valid UTF-8".to_string(),
        })?;

        records.push(SecretObjectVersion::new(
            object_name,
            strip_line_terminator(&content),
        ));
    }

    if records.is_empty() {
        return Err(RotationError::NoMetadataWritten(dir));
    }

    records.sort_by(|a, b| a.object_name.cmp(&b.object_name));
    debug!("Read {} object versions", records.len());
    Ok(records)
}

/// Remove exactly one trailing line terminator
fn strip_line_terminator(content: &str) -> &str {
    content
        .strip_suffix("\r\n")
        .or_else(|| content.strip_suffix('\n'))
        .unwrap_or(content)
}

fn read_error(path: &Path, err: std::io::Error) -> RotationError {
    RotationError::MetadataRead {
        path: PathBuf::from(path),
        message: err.to_string(),
    }
}
