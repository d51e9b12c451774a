//! Indexing and retrieval pipeline for kb
//!
//! This crate provides the document chunker, the vector indexer and
//! retriever built on the core traits, and the local and Qdrant vector stores.

mod chunker;
mod document_indexer;
mod retriever;
mod vector_store;

#[cfg(test)]
mod test_support;

pub use chunker::DocumentChunker;
pub use document_indexer::VectorIndexer;
pub use retriever::VectorRetriever;
pub use vector_store::{LocalVectorStore, QdrantConfig, QdrantVectorStore};

// Re-export core types for convenience
pub use kb_core::{
    Chunk, ChunkingConfig, CollectionConfig, DocumentIndexer, DocumentReport, EmbeddingProvider,
    Error, IndexingConfig, IndexingResult, Result, RetrievalConfig, Retriever, SearchResult,
    VectorStore,
};
