//! Milvus REST client implementation

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use kb_core::{
    CollectionConfig, Error, FilterExpr, IndexRecord, Result, SearchRequest, SearchResult,
    VectorStore,
};

use crate::config::MilvusConfig;
use crate::wire::{self, Envelope};

/// Vector store backed by a Milvus server
pub struct MilvusVectorStore {
    config: MilvusConfig,
    base_url: Url,
    client: Client,
}

impl MilvusVectorStore {
    /// Create a new Milvus client from configuration
    pub fn new(config: MilvusConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// Create a new Milvus client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = MilvusConfig::from_env()?;
        Self::new(config)
    }

    /// POST a request body to an API path, decoding the response envelope
    async fn post(&self, path: &str, body: Value) -> Result<Envelope> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mut request = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(token) = &self.config.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::VectorStore(format!(
                "milvus {} failed with status {}: {}",
                path, status, error_text
            )));
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|e| Error::VectorStore(format!("malformed milvus response for {}: {}", path, e)))
    }

    async fn has_collection(&self, collection: &str) -> Result<bool> {
        let data = self
            .post(
                "collections/has",
                json!({ "dbName": self.config.database, "collectionName": collection }),
            )
            .await?
            .into_data("has collection")?;

        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }
}

fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("milvus request timed out: {}", err))
    } else {
        Error::VectorStore(format!("milvus unreachable: {}", err))
    }
}

#[async_trait]
impl VectorStore for MilvusVectorStore {
    fn backend(&self) -> &'static str {
        "milvus"
    }

    async fn ensure_collection(&self, collection: &CollectionConfig) -> Result<bool> {
        if self.has_collection(&collection.name).await? {
            debug!(collection = %collection.name, "collection already exists");
            return Ok(false);
        }

        self.post(
            "collections/create",
            wire::create_collection_body(&self.config.database, collection),
        )
        .await?
        .into_data("create collection")?;

        info!(
            collection = %collection.name,
            dimension = collection.dimension,
            metric = %collection.metric,
            "collection created"
        );
        Ok(true)
    }

    async fn ensure_loaded(&self, collection: &str) -> Result<()> {
        let envelope = self
            .post(
                "collections/load",
                json!({ "dbName": self.config.database, "collectionName": collection }),
            )
            .await?;

        if envelope.is_loaded() {
            Ok(())
        } else {
            Err(envelope.into_error("load collection"))
        }
    }

    async fn delete(&self, collection: &str, filter: &FilterExpr) -> Result<u64> {
        let data = self
            .post(
                "entities/delete",
                json!({
                    "dbName": self.config.database,
                    "collectionName": collection,
                    "filter": filter.to_string(),
                }),
            )
            .await?
            .into_data("delete")?;

        // Servers that do not report a count are treated as deleting nothing known
        let deleted = wire::read_count(&data, "deleteCount").unwrap_or(0);
        debug!(collection, filter = %filter, deleted, "records deleted");
        Ok(deleted)
    }

    async fn insert(&self, collection: &str, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let data = self
            .post(
                "entities/insert",
                wire::insert_body(&self.config.database, collection, &records),
            )
            .await?
            .into_data("insert")?;

        let inserted = wire::read_count(&data, "insertCount")
            .map(|count| count as usize)
            .unwrap_or(records.len());

        if inserted != records.len() {
            return Err(Error::VectorStore(format!(
                "milvus inserted {} of {} records",
                inserted,
                records.len()
            )));
        }
        Ok(inserted)
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let data = self
            .post(
                "entities/search",
                wire::search_body(&self.config.database, collection, request),
            )
            .await?
            .into_data("search")?;

        wire::parse_hits(data)
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool> {
        if !self.has_collection(collection).await? {
            return Ok(false);
        }

        self.post(
            "collections/drop",
            json!({ "dbName": self.config.database, "collectionName": collection }),
        )
        .await?
        .into_data("drop collection")?;

        info!(collection, "collection dropped");
        Ok(true)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let data = self
            .post("collections/list", json!({ "dbName": self.config.database }))
            .await?
            .into_data("list collections")?;

        wire::parse_collection_names(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        let store = MilvusVectorStore::new(MilvusConfig::default()).unwrap();
        assert_eq!(store.backend(), "milvus");
    }

    #[tokio::test]
    async fn test_empty_insert_skips_request() {
        // Nothing listens on this port; an empty insert must not try to connect
        let store = MilvusVectorStore::new(MilvusConfig::new("http://127.0.0.1:9")).unwrap();
        assert_eq!(store.insert("biz", Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_error() {
        let store = MilvusVectorStore::new(MilvusConfig::new("http://127.0.0.1:9")).unwrap();
        let err = store.list_collections().await.unwrap_err();
        assert!(matches!(err, Error::VectorStore(_) | Error::Timeout(_)));
    }
}
