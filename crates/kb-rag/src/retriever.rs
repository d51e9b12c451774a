//! Retriever implementation

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

use kb_core::{
    CollectionConfig, EmbeddingProvider, Error, Result, RetrievalConfig, Retriever,
    SearchRequest, SearchResult, VectorStore,
};

/// Embeds queries and runs top-K similarity search against one collection
pub struct VectorRetriever<E: EmbeddingProvider, V: VectorStore> {
    embedder: Arc<E>,
    store: Arc<V>,
    collection: CollectionConfig,
    config: RetrievalConfig,
}

impl<E: EmbeddingProvider, V: VectorStore> VectorRetriever<E, V> {
    pub fn new(
        embedder: Arc<E>,
        store: Arc<V>,
        collection: CollectionConfig,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            config,
        }
    }

    async fn call<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.config.call_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not finish within {}s",
                operation, self.config.call_timeout_secs
            ))),
        }
    }

    /// Render results as a numbered context block for prompt assembly
    pub fn build_context(results: &[SearchResult]) -> String {
        if results.is_empty() {
            return String::new();
        }

        let mut context = String::from("Relevant knowledge base excerpts:\n\n");

        for (i, result) in results.iter().enumerate() {
            context.push_str(&format!("{}. ", i + 1));

            if let Some(title) = result.metadata.get("title").and_then(|t| t.as_str()) {
                context.push_str(&format!("[{}] ", title));
            }

            context.push_str(&result.content);
            context.push_str("\n\n");
        }

        context
    }
}

#[async_trait]
impl<E, V> Retriever for VectorRetriever<E, V>
where
    E: EmbeddingProvider + 'static,
    V: VectorStore + 'static,
{
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::InvalidInput("top_k must be greater than zero".to_string()));
        }
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is blank".to_string()));
        }

        let vector = self.call("query embedding", self.embedder.embed(query)).await?;
        if vector.len() != self.collection.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.collection.dimension,
                actual: vector.len(),
            });
        }

        let request = SearchRequest {
            vector,
            top_k,
            metric: self.collection.metric,
            nprobe: self.config.nprobe,
        };
        let results = self
            .call("search", self.store.search(&self.collection.name, &request))
            .await?;

        debug!(
            collection = %self.collection.name,
            top_k,
            hits = results.len(),
            "search completed"
        );
        Ok(results)
    }

    async fn search_default(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search(query, self.config.top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{HashEmbedder, ShortEmbedder, local_store};
    use kb_core::{ChunkMetadata, IndexRecord, MetricType, VectorStore, record_id};
    use serde_json::json;

    const DIM: usize = 8;

    fn collection(metric: MetricType) -> CollectionConfig {
        CollectionConfig {
            name: "test".to_string(),
            dimension: DIM,
            metric,
            ..CollectionConfig::default()
        }
    }

    async fn seeded(
        metric: MetricType,
        texts: &[&str],
    ) -> VectorRetriever<HashEmbedder, crate::LocalVectorStore> {
        let collection = collection(metric);
        let store = local_store(&collection).await;
        let embedder = HashEmbedder::new(DIM);

        let records = texts
            .iter()
            .enumerate()
            .map(|(i, text)| IndexRecord {
                id: record_id("/kb/doc.md", i),
                content: text.to_string(),
                vector: embedder.vector(text),
                metadata: ChunkMetadata {
                    source: "/kb/doc.md".to_string(),
                    extension: ".md".to_string(),
                    file_name: "doc.md".to_string(),
                    chunk_index: i,
                    total_chunks: texts.len(),
                    title: Some(format!("T{}", i)),
                },
            })
            .collect();
        store.insert("test", records).await.unwrap();

        VectorRetriever::new(
            Arc::new(embedder),
            store,
            collection,
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_exact_match_ranks_first() {
        let retriever = seeded(
            MetricType::L2,
            &["disk usage is high", "cpu load spikes", "memory leak in worker"],
        )
        .await;

        let results = retriever.search("cpu load spikes", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "cpu load spikes");
        assert_eq!(results[0].score, 0.0);
        assert_eq!(results[0].metadata["title"], json!("T1"));
        assert_eq!(results[0].metadata["_source"], json!("/kb/doc.md"));
    }

    #[tokio::test]
    async fn test_cosine_metric_used_for_ranking() {
        let retriever = seeded(MetricType::Cosine, &["alpha", "beta gamma"]).await;

        let results = retriever.search("beta gamma", 2).await.unwrap();
        assert_eq!(results[0].content, "beta gamma");
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_invalid_queries() {
        let retriever = seeded(MetricType::L2, &["anything"]).await;

        assert!(matches!(
            retriever.search("query", 0).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            retriever.search("  \n", 3).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_results() {
        let retriever = seeded(MetricType::L2, &[]).await;
        assert!(retriever.search("nothing here", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_default_uses_configured_top_k() {
        let retriever = seeded(MetricType::L2, &["a one", "b two", "c three", "d four", "e five"]).await;
        assert_eq!(retriever.search_default("one").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_provider_dimension_mismatch() {
        let collection = collection(MetricType::L2);
        let store = local_store(&collection).await;
        let retriever = VectorRetriever::new(
            Arc::new(ShortEmbedder),
            store,
            collection,
            RetrievalConfig::default(),
        );

        assert!(matches!(
            retriever.search("query", 3).await,
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let retriever = seeded(MetricType::L2, &["doc"]).await;
        assert!(matches!(
            retriever.search("please FAIL", 3).await,
            Err(Error::EmbeddingProvider(_))
        ));
    }

    #[test]
    fn test_build_context_empty() {
        assert_eq!(
            VectorRetriever::<HashEmbedder, crate::LocalVectorStore>::build_context(&[]),
            ""
        );
    }
}
