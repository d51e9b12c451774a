//! Source document identity: path normalization and deterministic record ids

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Builder;

use crate::{Error, Result};

/// Canonical `_source` value for a document path.
///
/// The path is made absolute against the current directory (the file system
/// is not consulted), `.` and `..` are resolved lexically, and separators are
/// rendered as `/` so the value is stable across platforms and can be used
/// inside a store filter expression.
pub fn normalize_source_path(path: &Path) -> Result<String> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidInput("document path is empty".to_string()));
    }

    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    Ok(normalized.to_string_lossy().replace('\\', "/"))
}

/// Deterministic record id for one chunk position of one source.
///
/// Name-based (MD5, version 3 layout) UUID over `"<source>_<chunk_index>"`,
/// so re-inserting the same position always targets the same primary key.
pub fn record_id(source: &str, chunk_index: usize) -> String {
    let digest = md5::compute(format!("{}_{}", source, chunk_index));
    Builder::from_md5_bytes(digest.0).into_uuid().to_string()
}

/// File-level facts recorded in every chunk's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub source: String,
    pub file_name: String,
    /// Extension including the leading dot, empty when there is none
    pub extension: String,
}

impl SourceFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = normalize_source_path(path)?;
        let file_name = source.rsplit('/').next().unwrap_or_default().to_string();
        let extension = match file_name.rfind('.') {
            Some(dot) if dot > 0 => file_name[dot..].to_string(),
            _ => String::new(),
        };

        Ok(Self {
            source,
            file_name,
            extension,
        })
    }
}
