//! DashScope embedding client implementation

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use kb_core::{EmbeddingProvider, Error, Result};

use crate::config::DashScopeConfig;

/// DashScope text-embedding client
pub struct DashScopeEmbedder {
    config: DashScopeConfig,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingInput<'a> {
    texts: &'a [String],
}

#[derive(Serialize)]
struct EmbeddingParams {
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
    parameters: EmbeddingParams,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    text_index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingOutput {
    #[serde(default)]
    embeddings: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    output: Option<EmbeddingOutput>,
    code: Option<String>,
    message: Option<String>,
}

impl DashScopeEmbedder {
    /// Model constants
    pub const TEXT_EMBEDDING_V4: &'static str = "text-embedding-v4";
    pub const TEXT_EMBEDDING_V3: &'static str = "text-embedding-v3";

    /// Most texts the service accepts in one request
    pub const MAX_BATCH_SIZE: usize = 10;

    /// Create a new DashScope client from configuration
    pub fn new(config: DashScopeConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        debug!(
            model = %config.model,
            dimension = config.dimension,
            api_key = %config.masked_key(),
            "DashScope embedder configured"
        );

        Ok(Self { config, client })
    }

    /// Create a new DashScope client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = DashScopeConfig::from_env()?;
        Self::new(config)
    }

    /// Set the embedding model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/services/embeddings/text-embedding/text-embedding",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Perform one embedding request of at most `MAX_BATCH_SIZE` texts
    async fn perform_embedding(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest {
            model: &self.config.model,
            input: EmbeddingInput { texts },
            parameters: EmbeddingParams {
                dimension: self.config.dimension,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        parse_embedding_response(status, &body, texts.len())
    }
}

fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("DashScope request timed out: {}", err))
    } else {
        Error::Network(err.to_string())
    }
}

/// Turn a raw DashScope reply into vectors ordered by input position
fn parse_embedding_response(
    status: StatusCode,
    body: &str,
    expected: usize,
) -> Result<Vec<Vec<f32>>> {
    let parsed: Option<EmbeddingResponse> = serde_json::from_str(body).ok();

    let code = parsed.as_ref().and_then(|r| r.code.clone());
    let message = parsed
        .as_ref()
        .and_then(|r| r.message.clone())
        .unwrap_or_else(|| body.to_string());

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        || code.as_deref() == Some("InvalidApiKey")
    {
        return Err(Error::Authentication(format!(
            "DashScope rejected the API key: {}",
            message
        )));
    }

    if !status.is_success() {
        return Err(Error::EmbeddingProvider(format!(
            "DashScope request failed with status {}: {}",
            status, message
        )));
    }

    let output = parsed.and_then(|r| r.output).ok_or_else(|| {
        Error::EmbeddingProvider(format!("DashScope response has no output: {}", body))
    })?;

    let mut items = output.embeddings;
    if items.len() != expected {
        return Err(Error::EmbeddingProvider(format!(
            "DashScope returned {} embeddings for {} texts",
            items.len(),
            expected
        )));
    }

    items.sort_by_key(|item| item.text_index);

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if item.text_index != i {
                return Err(Error::EmbeddingProvider(format!(
                    "DashScope response is missing text_index {}",
                    i
                )));
            }
            if item.embedding.is_empty() {
                return Err(Error::EmbeddingProvider(format!(
                    "DashScope returned an empty embedding for text {}",
                    i
                )));
            }
            Ok(item.embedding)
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for DashScopeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(Error::EmptyInput(format!("text {} is blank", pos)));
        }

        let deadline = Duration::from_secs(self.config.timeout_secs);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(Self::MAX_BATCH_SIZE) {
            let embedding_future = self.perform_embedding(batch);

            let batch_vectors = match timeout(deadline, embedding_future).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(model = %self.config.model, size = batch.len(), "embedding request timed out");
                    return Err(Error::Timeout("Request timed out".to_string()));
                }
            };
            vectors.extend(batch_vectors);
        }

        debug!(model = %self.config.model, count = vectors.len(), "texts embedded");
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
