//! Document indexer implementation

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use kb_core::{
    Chunk, ChunkMetadata, CollectionConfig, DocumentIndexer, DocumentReport, EmbeddingProvider,
    Error, FilterExpr, IndexRecord, IndexingConfig, IndexingResult, Result, SourceFile,
    VectorStore, normalize_source_path, record_id,
};

use crate::chunker::DocumentChunker;

/// Registry of per-source async locks.
///
/// Entries exist only while some task holds or waits for the lock.
#[derive(Default)]
struct SourceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct SourceGuard<'a> {
    registry: &'a SourceLocks,
    source: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SourceLocks {
    async fn acquire(&self, source: &str) -> SourceGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(source.to_string()).or_default().clone()
        };

        // Created before waiting so a cancelled wait still cleans up the entry
        let mut pending = SourceGuard {
            registry: self,
            source: source.to_string(),
            guard: None,
        };
        pending.guard = Some(lock.lock_owned().await);
        pending
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self
            .registry
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.source)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.source);
        }
    }
}

/// Re-indexes documents into a vector collection.
///
/// Per document: lock the source path, read, chunk, embed every chunk, then
/// delete the source's stale records and insert the fresh ones. Embedding
/// finishes before anything is deleted, so an embedding failure leaves the
/// previous index state untouched.
pub struct VectorIndexer<E: EmbeddingProvider, V: VectorStore> {
    embedder: Arc<E>,
    store: Arc<V>,
    chunker: DocumentChunker,
    collection: CollectionConfig,
    config: IndexingConfig,
    locks: SourceLocks,
}

impl<E: EmbeddingProvider, V: VectorStore> VectorIndexer<E, V> {
    pub fn new(
        embedder: Arc<E>,
        store: Arc<V>,
        chunker: DocumentChunker,
        collection: CollectionConfig,
        config: IndexingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker,
            collection,
            config,
            locks: SourceLocks::default(),
        }
    }

    pub fn collection(&self) -> &CollectionConfig {
        &self.collection
    }

    /// Run one provider or store call under the configured deadline
    async fn call<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.config.call_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not finish within {}s",
                operation, self.config.call_timeout_secs
            ))),
        }
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let batch_vectors = self
                .call("embedding", self.embedder.embed_batch(&texts))
                .await?;

            if batch_vectors.len() != batch.len() {
                return Err(Error::EmbeddingProvider(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    batch_vectors.len()
                )));
            }
            for vector in &batch_vectors {
                if vector.len() != self.collection.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: self.collection.dimension,
                        actual: vector.len(),
                    });
                }
            }

            debug!(
                embedded = vectors.len() + batch_vectors.len(),
                total = chunks.len(),
                "chunk batch embedded"
            );
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    /// Remove a source's records; failures are logged and reported as 0
    async fn delete_stale(&self, source: &str) -> u64 {
        match self.delete_source(source).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(source, error = %e, "failed to delete stale records, continuing");
                0
            }
        }
    }

    async fn delete_source(&self, source: &str) -> Result<u64> {
        let name = &self.collection.name;
        self.call("load collection", self.store.ensure_loaded(name))
            .await?;
        self.call("delete", self.store.delete(name, &FilterExpr::source(source)))
            .await
    }

    fn build_records(
        &self,
        file: &SourceFile,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Vec<IndexRecord> {
        let total_chunks = chunks.len();

        chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let mut content = chunk.content;
                if truncate_at_char_boundary(&mut content, self.collection.content_max_length) {
                    warn!(
                        source = %file.source,
                        chunk_index = chunk.chunk_index,
                        max_bytes = self.collection.content_max_length,
                        "chunk content truncated"
                    );
                }

                IndexRecord {
                    id: record_id(&file.source, chunk.chunk_index),
                    content,
                    vector,
                    metadata: ChunkMetadata {
                        source: file.source.clone(),
                        extension: file.extension.clone(),
                        file_name: file.file_name.clone(),
                        chunk_index: chunk.chunk_index,
                        total_chunks,
                        title: chunk.title,
                    },
                }
            })
            .collect()
    }

    async fn insert_records(&self, source: &str, records: Vec<IndexRecord>) -> Result<usize> {
        let total = records.len();
        let mut inserted = 0;
        let mut pending = records.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<IndexRecord> = pending
                .by_ref()
                .take(self.config.insert_batch_size.max(1))
                .collect();
            let batch_len = batch.len();

            match self
                .call("insert", self.store.insert(&self.collection.name, batch))
                .await
            {
                Ok(_) => inserted += batch_len,
                Err(e) if inserted == 0 => return Err(e),
                Err(e) => {
                    return Err(Error::PartialIndex {
                        document: source.to_string(),
                        inserted,
                        total,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(inserted)
    }

    async fn list_eligible(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if self.config.is_allowed(&name.to_string_lossy()) {
                files.push(entry.path());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }
}

/// Shorten `text` to at most `max_bytes`, backing off to a char boundary.
/// Returns whether anything was cut.
fn truncate_at_char_boundary(text: &mut String, max_bytes: usize) -> bool {
    if text.len() <= max_bytes {
        return false;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}

#[async_trait]
impl<E, V> DocumentIndexer for VectorIndexer<E, V>
where
    E: EmbeddingProvider + 'static,
    V: VectorStore + 'static,
{
    async fn index_document(&self, path: &Path) -> Result<DocumentReport> {
        let is_file = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let file = SourceFile::from_path(path)?;
        let _guard = self.locks.acquire(&file.source).await;
        let started = Instant::now();

        let content = tokio::fs::read_to_string(path).await?;
        let chunks = self.chunker.chunk_document(&content, &file.source);
        let vectors = self.embed_chunks(&chunks).await?;

        let deleted = self.delete_stale(&file.source).await;

        let records = self.build_records(&file, chunks, vectors);
        let inserted = self.insert_records(&file.source, records).await?;

        info!(
            source = %file.source,
            chunks = inserted,
            deleted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document indexed"
        );

        Ok(DocumentReport {
            source: file.source,
            chunks: inserted,
            deleted,
        })
    }

    async fn index_directory(&self, dir: Option<&Path>) -> Result<IndexingResult> {
        let dir = dir.unwrap_or(self.config.upload_dir.as_path());

        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::InvalidInput(format!(
                    "not a directory: {}",
                    dir.display()
                )));
            }
            Err(_) => return Err(Error::NotFound(dir.to_path_buf())),
        }

        let files = self.list_eligible(dir).await?;
        let label = normalize_source_path(dir).unwrap_or_else(|_| dir.display().to_string());

        let mut result = IndexingResult::started(label);
        result.total_files = files.len();
        info!(directory = %result.directory, files = files.len(), "indexing directory");

        let outcomes: Vec<(PathBuf, Result<DocumentReport>)> = stream::iter(files)
            .map(|path| async move {
                let outcome = self.index_document(&path).await;
                (path, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_files.max(1))
            .collect()
            .await;

        for (path, outcome) in outcomes {
            match outcome {
                Ok(_) => result.record_success(),
                Err(e) => {
                    let source =
                        normalize_source_path(&path).unwrap_or_else(|_| path.display().to_string());
                    error!(source = %source, error = %e, "failed to index file");
                    result.record_failure(source, e.to_string());
                }
            }
        }

        result.finish();
        info!(
            directory = %result.directory,
            total = result.total_files,
            succeeded = result.success_count,
            failed = result.fail_count,
            elapsed_ms = result.duration_ms(),
            "directory indexed"
        );
        Ok(result)
    }

    async fn remove_document(&self, path: &Path) -> Result<u64> {
        let source = normalize_source_path(path)?;
        let _guard = self.locks.acquire(&source).await;

        let deleted = self.delete_source(&source).await?;
        info!(source = %source, deleted, "document removed");
        Ok(deleted)
    }
}
