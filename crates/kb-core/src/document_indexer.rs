//! Document indexer trait and types

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Outcome of re-indexing one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Normalized source path
    pub source: String,
    /// Records written for this run
    pub chunks: usize,
    /// Stale records removed before writing (0 when the delete was skipped)
    pub deleted: u64,
}

/// Result of indexing a directory
///
/// Built even when files fail; `success` is true only when no file failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingResult {
    pub directory: String,
    pub total_files: usize,
    pub success_count: usize,
    pub fail_count: usize,
    /// Failed file path -> error message
    pub failed_files: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
}

impl IndexingResult {
    /// Start an empty result for `directory`, stamped now
    pub fn started(directory: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            directory: directory.into(),
            total_files: 0,
            success_count: 0,
            fail_count: 0,
            failed_files: BTreeMap::new(),
            started_at: now,
            finished_at: now,
            success: false,
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, path: impl Into<String>, error: impl Into<String>) {
        self.fail_count += 1;
        self.failed_files.insert(path.into(), error.into());
    }

    /// Stamp the end time and settle the overall flag
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.success = self.fail_count == 0;
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Trait for document indexers
///
/// Re-indexing a document replaces every record previously stored for its
/// source path.
#[async_trait]
pub trait DocumentIndexer: Send + Sync {
    /// Re-index a single file. Fails with `NotFound` when `path` is not an
    /// existing file.
    async fn index_document(&self, path: &Path) -> Result<DocumentReport>;

    /// Re-index every eligible file directly inside `dir` (not recursive),
    /// defaulting to the configured upload directory. File-level failures
    /// are recorded in the result; only directory-level problems are errors.
    async fn index_directory(&self, dir: Option<&Path>) -> Result<IndexingResult>;

    /// Remove every record for a source path, returning how many were deleted
    async fn remove_document(&self, path: &Path) -> Result<u64>;
}
