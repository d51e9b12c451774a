//! Embedding provider trait

use async_trait::async_trait;

use crate::{Error, Result};

/// Trait for remote text embedding services
///
/// Implementations map text to fixed-length vectors of `dimension()` floats.
/// Failures are reported as `Authentication` (bad or missing credential),
/// `EmptyInput` (blank text) or `EmbeddingProvider` (anything else,
/// including empty result payloads).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput("cannot embed blank text".to_string()));
        }

        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingProvider("provider returned no vector".to_string()))
    }

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Model identifier, for logs
    fn model_id(&self) -> &str;
}
