//! Core traits and types for kb
//!
//! This crate defines the fundamental traits and types used across the
//! indexing and retrieval pipeline. It provides capability-facing interfaces
//! for embedding providers, vector stores, document indexers and retrievers,
//! making the pipeline test-friendly and backend-agnostic.

pub mod config;
pub mod document_indexer;
pub mod embedding;
pub mod error;
pub mod retriever;
pub mod similarity;
pub mod source;
pub mod types;
pub mod vector_store;


pub use config::{ChunkingConfig, CollectionConfig, IndexingConfig, RetrievalConfig};
pub use document_indexer::{DocumentIndexer, DocumentReport, IndexingResult};
pub use embedding::EmbeddingProvider;
pub use error::{Error, ErrorKind, Result};
pub use retriever::Retriever;
pub use similarity::cosine_similarity;
pub use source::{SourceFile, normalize_source_path, record_id};
pub use types::*;
pub use vector_store::{
    ChunkMetadata, FilterExpr, IndexRecord, SearchRequest, SearchResult, VectorStore,
};
