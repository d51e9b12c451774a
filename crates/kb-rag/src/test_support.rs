//! Test doubles shared by the pipeline tests

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kb_core::{
    CollectionConfig, EmbeddingProvider, Error, FilterExpr, IndexRecord, Result, SearchRequest,
    SearchResult, VectorStore,
};

use crate::LocalVectorStore;

/// Deterministic embedder: byte histogram folded into `dimension` buckets.
/// Any text containing `FAIL` is rejected with a provider error.
pub struct HashEmbedder {
    pub dimension: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[(byte as usize + i) % self.dimension] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts
            .iter()
            .map(|text| {
                if text.contains("FAIL") {
                    Err(Error::EmbeddingProvider("quota exceeded".to_string()))
                } else {
                    Ok(self.vector(text))
                }
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "hash-test"
    }
}

/// Embedder that returns vectors of the wrong length
pub struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_id(&self) -> &str {
        "short-test"
    }
}

/// Embedder that never answers
pub struct StuckEmbedder;

#[async_trait]
impl EmbeddingProvider for StuckEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        std::future::pending().await
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_id(&self) -> &str {
        "stuck-test"
    }
}

/// Wraps a `LocalVectorStore`, counting calls and optionally failing
pub struct RecordingStore {
    pub inner: LocalVectorStore,
    pub insert_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// Insert call number (1-based) that fails, 0 for never
    pub fail_insert_on: usize,
    pub fail_delete: bool,
}

impl RecordingStore {
    pub fn new(inner: LocalVectorStore) -> Self {
        Self {
            inner,
            insert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            fail_insert_on: 0,
            fail_delete: false,
        }
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    fn backend(&self) -> &'static str {
        "recording"
    }

    async fn ensure_collection(&self, collection: &CollectionConfig) -> Result<bool> {
        self.inner.ensure_collection(collection).await
    }

    async fn ensure_loaded(&self, collection: &str) -> Result<()> {
        self.inner.ensure_loaded(collection).await
    }

    async fn delete(&self, collection: &str, filter: &FilterExpr) -> Result<u64> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(Error::VectorStore("delete rejected".to_string()));
        }
        self.inner.delete(collection, filter).await
    }

    async fn insert(&self, collection: &str, records: Vec<IndexRecord>) -> Result<usize> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_insert_on {
            return Err(Error::VectorStore("insert rejected".to_string()));
        }
        self.inner.insert(collection, records).await
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        self.inner.search(collection, request).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        self.inner.drop_collection(collection).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }
}

/// A local store with the collection described by `config` created
pub async fn local_store(config: &CollectionConfig) -> Arc<LocalVectorStore> {
    let store = LocalVectorStore::new();
    store.ensure_collection(config).await.unwrap();
    Arc::new(store)
}
