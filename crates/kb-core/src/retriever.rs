//! Retriever trait

use async_trait::async_trait;

use crate::{Result, SearchResult};

/// Trait for similarity retrieval over indexed documents
///
/// Results come back in the store's native ranking, best match first, with
/// no re-ranking, deduplication or score thresholding applied. An empty
/// store match is an empty vector, never an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve the `top_k` closest chunks to `query`. `top_k == 0` and a
    /// blank query are `InvalidInput`.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>>;

    /// Retrieve with the configured default top-K
    async fn search_default(&self, query: &str) -> Result<Vec<SearchResult>>;
}
