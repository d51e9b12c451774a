//! Vector store implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, QdrantError};
use serde_json::json;

use kb_core::config::{env_or, process_env};
use kb_core::similarity::{cosine_similarity, inner_product, l2_distance_squared};
use kb_core::vector_store::{CONTENT_FIELD, METADATA_FIELD};
use kb_core::{
    CollectionConfig, Error, FilterExpr, IndexRecord, MetricType, Result, SearchRequest,
    SearchResult, VectorStore,
};

struct LocalCollection {
    config: CollectionConfig,
    records: HashMap<String, IndexRecord>,
}

/// Local in-memory vector store implementation
///
/// Enforces the same schema limits a remote store would (vector dimension,
/// id and content lengths) and ranks exhaustively with the collection's
/// metric. Used for tests and offline runs.
#[derive(Clone, Default)]
pub struct LocalVectorStore {
    collections: Arc<RwLock<HashMap<String, LocalCollection>>>,
}

impl LocalVectorStore {
    /// Create a new local vector store
    pub fn new() -> Self {
        Self::default()
    }

    /// Records matching `filter`, ordered by chunk index
    pub fn records(&self, collection: &str, filter: &FilterExpr) -> Result<Vec<IndexRecord>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        let coll = lookup(&collections, collection)?;

        let mut records: Vec<IndexRecord> = coll
            .records
            .values()
            .filter(|record| filter.matches(&record.metadata))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.metadata.chunk_index);
        Ok(records)
    }

    /// Total records in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        Ok(lookup(&collections, collection)?.records.len())
    }
}

fn lookup<'a>(
    collections: &'a HashMap<String, LocalCollection>,
    name: &str,
) -> Result<&'a LocalCollection> {
    collections
        .get(name)
        .ok_or_else(|| Error::VectorStore(format!("collection not found: {}", name)))
}

fn score(metric: MetricType, query: &[f32], vector: &[f32]) -> Result<f32> {
    match metric {
        MetricType::L2 => l2_distance_squared(query, vector),
        MetricType::Cosine => cosine_similarity(query, vector),
        MetricType::Ip => inner_product(query, vector),
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn ensure_collection(&self, collection: &CollectionConfig) -> Result<bool> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;

        if collections.contains_key(&collection.name) {
            return Ok(false);
        }
        collections.insert(
            collection.name.clone(),
            LocalCollection {
                config: collection.clone(),
                records: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn ensure_loaded(&self, collection: &str) -> Result<()> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        lookup(&collections, collection).map(|_| ())
    }

    async fn delete(&self, collection: &str, filter: &FilterExpr) -> Result<u64> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::VectorStore(format!("collection not found: {}", collection)))?;

        let before = coll.records.len();
        coll.records
            .retain(|_, record| !filter.matches(&record.metadata));
        Ok((before - coll.records.len()) as u64)
    }

    async fn insert(&self, collection: &str, records: Vec<IndexRecord>) -> Result<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::VectorStore(format!("collection not found: {}", collection)))?;

        // Validate the whole batch before writing any of it
        for record in &records {
            if record.vector.len() != coll.config.dimension {
                return Err(Error::DimensionMismatch {
                    expected: coll.config.dimension,
                    actual: record.vector.len(),
                });
            }
            if record.id.len() > coll.config.id_max_length {
                return Err(Error::VectorStore(format!(
                    "id exceeds {} bytes: {}",
                    coll.config.id_max_length, record.id
                )));
            }
            if record.content.len() > coll.config.content_max_length {
                return Err(Error::VectorStore(format!(
                    "content of {} exceeds {} bytes",
                    record.id, coll.config.content_max_length
                )));
            }
        }

        let inserted = records.len();
        for record in records {
            coll.records.insert(record.id.clone(), record);
        }
        Ok(inserted)
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        let coll = lookup(&collections, collection)?;

        if request.vector.len() != coll.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: coll.config.dimension,
                actual: request.vector.len(),
            });
        }

        let mut scored = Vec::with_capacity(coll.records.len());
        for record in coll.records.values() {
            scored.push((score(request.metric, &request.vector, &record.vector)?, record));
        }

        let higher_is_better = request.metric.higher_is_better();
        scored.sort_by(|(a, ra), (b, rb)| {
            let by_score = if higher_is_better {
                b.partial_cmp(a)
            } else {
                a.partial_cmp(b)
            };
            by_score.unwrap_or(Ordering::Equal).then_with(|| ra.id.cmp(&rb.id))
        });

        scored
            .into_iter()
            .take(request.top_k)
            .map(|(score, record)| {
                Ok(SearchResult {
                    id: record.id.clone(),
                    content: record.content.clone(),
                    score,
                    metadata: serde_json::to_value(&record.metadata)?,
                })
            })
            .collect()
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        Ok(collections.remove(collection).is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Qdrant connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        }
    }
}

impl QdrantConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            url: env_or(&lookup, "QDRANT_URL", defaults.url)?,
            api_key: lookup("QDRANT_API_KEY").filter(|key| !key.trim().is_empty()),
        })
    }
}

/// Qdrant vector store implementation
///
/// Records become points keyed by the record id (a UUID), with `content`
/// and `metadata` stored in the payload. The source filter targets the
/// nested `metadata._source` payload key.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .build()
            .map_err(store_error)?;
        Ok(Self { client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&QdrantConfig::from_env()?)
    }
}

fn store_error(err: QdrantError) -> Error {
    Error::VectorStore(format!("qdrant: {}", err))
}

fn distance(metric: MetricType) -> Distance {
    match metric {
        MetricType::L2 => Distance::Euclid,
        MetricType::Cosine => Distance::Cosine,
        MetricType::Ip => Distance::Dot,
    }
}

fn source_filter(filter: &FilterExpr) -> Filter {
    match filter {
        FilterExpr::SourceEquals(source) => Filter::must([Condition::matches(
            format!("{}._source", METADATA_FIELD),
            source.clone(),
        )]),
    }
}

fn point_from_record(record: IndexRecord) -> Result<PointStruct> {
    let payload = Payload::try_from(json!({
        CONTENT_FIELD: record.content,
        METADATA_FIELD: record.metadata,
    }))
    .map_err(store_error)?;
    Ok(PointStruct::new(record.id, record.vector, payload))
}

fn result_from_point(point: ScoredPoint) -> SearchResult {
    let id = match point.id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    };

    let mut payload = point.payload;
    let content = payload
        .remove(CONTENT_FIELD)
        .map(|value| value.into_json())
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    let metadata = payload
        .remove(METADATA_FIELD)
        .map(|value| value.into_json())
        .unwrap_or(serde_json::Value::Null);

    SearchResult {
        id,
        content,
        score: point.score,
        metadata,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_collection(&self, collection: &CollectionConfig) -> Result<bool> {
        if self
            .client
            .collection_exists(&collection.name)
            .await
            .map_err(store_error)?
        {
            return Ok(false);
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&collection.name)
                    .vectors_config(VectorParamsBuilder::new(
                        collection.dimension as u64,
                        distance(collection.metric),
                    ))
                    .shard_number(collection.shards),
            )
            .await
            .map_err(store_error)?;

        info!(collection = %collection.name, dimension = collection.dimension, "qdrant collection created");
        Ok(true)
    }

    async fn ensure_loaded(&self, collection: &str) -> Result<()> {
        // Qdrant keeps collections resident; existence is all there is to check
        if self
            .client
            .collection_exists(collection)
            .await
            .map_err(store_error)?
        {
            Ok(())
        } else {
            Err(Error::VectorStore(format!("collection not found: {}", collection)))
        }
    }

    async fn delete(&self, collection: &str, filter: &FilterExpr) -> Result<u64> {
        let matching = self
            .client
            .count(
                CountPointsBuilder::new(collection)
                    .filter(source_filter(filter))
                    .exact(true),
            )
            .await
            .map_err(store_error)?
            .result
            .map(|r| r.count)
            .unwrap_or(0);

        if matching == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(source_filter(filter))
                    .wait(true),
            )
            .await
            .map_err(store_error)?;

        debug!(collection, filter = %filter, deleted = matching, "qdrant points deleted");
        Ok(matching)
    }

    async fn insert(&self, collection: &str, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let count = records.len();
        let points = records
            .into_iter()
            .map(point_from_record)
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(store_error)?;
        Ok(count)
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, request.vector.clone(), request.top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(store_error)?;

        Ok(response.result.into_iter().map(result_from_point).collect())
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        if !self
            .client
            .collection_exists(collection)
            .await
            .map_err(store_error)?
        {
            return Ok(false);
        }

        self.client
            .delete_collection(collection)
            .await
            .map_err(store_error)?;
        Ok(true)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self.client.list_collections().await.map_err(store_error)?;
        let mut names: Vec<String> = response
            .collections
            .into_iter()
            .map(|description| description.name)
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::{ChunkMetadata, record_id};

    fn config(dimension: usize, metric: MetricType) -> CollectionConfig {
        CollectionConfig {
            name: "test".to_string(),
            dimension,
            metric,
            ..CollectionConfig::default()
        }
    }

    fn record(source: &str, index: usize, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: record_id(source, index),
            content: format!("{} #{}", source, index),
            vector,
            metadata: ChunkMetadata {
                source: source.to_string(),
                extension: ".md".to_string(),
                file_name: "doc.md".to_string(),
                chunk_index: index,
                total_chunks: 2,
                title: None,
            },
        }
    }

    fn query(vector: Vec<f32>, top_k: usize, metric: MetricType) -> SearchRequest {
        SearchRequest {
            vector,
            top_k,
            metric,
            nprobe: 10,
        }
    }

    #[tokio::test]
    async fn test_local_vector_store() {
        let store = LocalVectorStore::new();
        assert!(store.ensure_collection(&config(2, MetricType::L2)).await.unwrap());
        assert!(!store.ensure_collection(&config(2, MetricType::L2)).await.unwrap());
        store.ensure_loaded("test").await.unwrap();

        let inserted = store
            .insert(
                "test",
                vec![record("/a.md", 0, vec![1.0, 0.0]), record("/a.md", 1, vec![0.0, 1.0])],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count("test").unwrap(), 2);
        assert_eq!(store.list_collections().await.unwrap(), vec!["test".to_string()]);
    }

    #[tokio::test]
    async fn test_search_l2_lower_first() {
        let store = LocalVectorStore::new();
        store.ensure_collection(&config(2, MetricType::L2)).await.unwrap();
        store
            .insert(
                "test",
                vec![
                    record("/a.md", 0, vec![1.0, 0.0]),
                    record("/b.md", 0, vec![0.0, 1.0]),
                    record("/c.md", 0, vec![0.9, 0.1]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("test", &query(vec![1.0, 0.0], 2, MetricType::L2))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata["_source"], "/a.md");
        assert_eq!(results[1].metadata["_source"], "/c.md");
        assert!(results[0].score <= results[1].score);
    }

    #[tokio::test]
    async fn test_search_cosine_higher_first() {
        let store = LocalVectorStore::new();
        store.ensure_collection(&config(2, MetricType::Cosine)).await.unwrap();
        store
            .insert(
                "test",
                vec![record("/a.md", 0, vec![-1.0, 0.0]), record("/b.md", 0, vec![2.0, 0.1])],
            )
            .await
            .unwrap();

        let results = store
            .search("test", &query(vec![1.0, 0.0], 5, MetricType::Cosine))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata["_source"], "/b.md");
        assert!(results[0].score > 0.9);
        assert!(results[1].score < -0.9);
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let store = LocalVectorStore::new();
        store.ensure_collection(&config(2, MetricType::L2)).await.unwrap();
        store
            .insert(
                "test",
                vec![
                    record("/a.md", 0, vec![1.0, 0.0]),
                    record("/a.md", 1, vec![1.0, 0.0]),
                    record("/b.md", 0, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let deleted = store.delete("test", &FilterExpr::source("/a.md")).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.records("test", &FilterExpr::source("/a.md")).unwrap().is_empty());
        assert_eq!(store.records("test", &FilterExpr::source("/b.md")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_validates_whole_batch() {
        let store = LocalVectorStore::new();
        store.ensure_collection(&config(2, MetricType::L2)).await.unwrap();

        let err = store
            .insert(
                "test",
                vec![record("/a.md", 0, vec![1.0, 0.0]), record("/a.md", 1, vec![1.0])],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
        assert_eq!(store.count("test").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_collection_is_store_error() {
        let store = LocalVectorStore::new();
        assert!(matches!(
            store.ensure_loaded("nope").await,
            Err(Error::VectorStore(_))
        ));
        assert!(matches!(
            store.delete("nope", &FilterExpr::source("/a.md")).await,
            Err(Error::VectorStore(_))
        ));
        assert!(!store.drop_collection("nope").await.unwrap());
    }

    #[test]
    fn test_qdrant_config_lookup() {
        let config = QdrantConfig::from_lookup(|key| match key {
            "QDRANT_URL" => Some("http://qdrant:6334".to_string()),
            "QDRANT_API_KEY" => Some("  ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.url, "http://qdrant:6334");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_qdrant_distance_mapping() {
        assert_eq!(distance(MetricType::L2), Distance::Euclid);
        assert_eq!(distance(MetricType::Cosine), Distance::Cosine);
        assert_eq!(distance(MetricType::Ip), Distance::Dot);
    }
}
