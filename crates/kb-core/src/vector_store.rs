//! Vector store trait and types

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CollectionConfig, MetricType, Result};

/// Primary key field
pub const ID_FIELD: &str = "id";
/// Float vector field searched by similarity
pub const VECTOR_FIELD: &str = "vector";
/// Chunk text field
pub const CONTENT_FIELD: &str = "content";
/// JSON metadata field
pub const METADATA_FIELD: &str = "metadata";

/// Metadata attached to every stored chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "_source")]
    pub source: String,
    #[serde(rename = "_extension")]
    pub extension: String,
    #[serde(rename = "_file_name")]
    pub file_name: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One row of the vector collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Predicate selecting records for deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Every record whose `metadata._source` equals the value
    SourceEquals(String),
}

impl FilterExpr {
    pub fn source(source: impl Into<String>) -> Self {
        FilterExpr::SourceEquals(source.into())
    }

    /// Evaluate the predicate against typed metadata
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match self {
            FilterExpr::SourceEquals(source) => metadata.source == *source,
        }
    }
}

/// Renders the boolean expression understood by Milvus-style stores,
/// e.g. `metadata["_source"] == "/docs/a.md"`.
impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::SourceEquals(source) => {
                let escaped = source.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "{}[\"_source\"] == \"{}\"", METADATA_FIELD, escaped)
            }
        }
    }
}

/// A single top-K similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub metric: MetricType,
    /// IVF probe count passed through to the index
    pub nprobe: u32,
}

/// A ranked hit. `score` follows the store's metric: lower is better for
/// `L2`, higher for `COSINE` and `IP`. Metadata is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Trait for vector stores (e.g., Milvus, Qdrant)
///
/// Collections are addressed by name. Implementations must treat
/// `ensure_loaded` as idempotent: a collection that is already loaded is
/// success, not an error.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs
    fn backend(&self) -> &'static str;

    /// Create the collection (schema and vector index) if it does not exist.
    /// Returns whether it was created.
    async fn ensure_collection(&self, collection: &CollectionConfig) -> Result<bool>;

    /// Make the collection available for delete and search
    async fn ensure_loaded(&self, collection: &str) -> Result<()>;

    /// Delete every record matching `filter`, returning how many were removed
    async fn delete(&self, collection: &str, filter: &FilterExpr) -> Result<u64>;

    /// Insert records, returning how many were written
    async fn insert(&self, collection: &str, records: Vec<IndexRecord>) -> Result<usize>;

    /// Top-K similarity search, best match first
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>>;

    /// Drop the collection, returning whether it existed
    async fn drop_collection(&self, collection: &str) -> Result<bool>;

    /// Names of all collections
    async fn list_collections(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(title: Option<&str>) -> ChunkMetadata {
        ChunkMetadata {
            source: "/docs/a.md".to_string(),
            extension: ".md".to_string(),
            file_name: "a.md".to_string(),
            chunk_index: 2,
            total_chunks: 5,
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_filter_expression_rendering() {
        let filter = FilterExpr::source("/docs/a.md");
        assert_eq!(filter.to_string(), r#"metadata["_source"] == "/docs/a.md""#);

        let tricky = FilterExpr::source(r#"/docs/say "hi".md"#);
        assert_eq!(
            tricky.to_string(),
            r#"metadata["_source"] == "/docs/say \"hi\".md""#
        );
    }

    #[test]
    fn test_filter_matches_source_only() {
        let filter = FilterExpr::source("/docs/a.md");
        assert!(filter.matches(&metadata(None)));
        assert!(!FilterExpr::source("/docs/b.md").matches(&metadata(None)));
    }

    #[test]
    fn test_metadata_title_omitted_when_absent() {
        let json = serde_json::to_value(metadata(None)).unwrap();
        assert!(json.get("title").is_none());
        assert_eq!(json["_source"], "/docs/a.md");
        assert_eq!(json["chunk_index"], 2);

        let json = serde_json::to_value(metadata(Some("Restart"))).unwrap();
        assert_eq!(json["title"], "Restart");
    }
}
