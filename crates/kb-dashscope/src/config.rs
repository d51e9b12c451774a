//! DashScope configuration

use serde::{Deserialize, Serialize};

use kb_core::config::{env_or, process_env};
use kb_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";
const DEFAULT_MODEL: &str = "text-embedding-v4";
const PLACEHOLDER_KEY: &str = "your-api-key-here";

/// Configuration for the DashScope embedding client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Requested output dimension; must match the collection
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl DashScopeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("DASHSCOPE_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .ok_or_else(|| {
                Error::Configuration(
                    "DASHSCOPE_API_KEY or API_KEY environment variable not found".to_string(),
                )
            })?;

        let config = Self {
            api_key,
            model: env_or(&lookup, "DASHSCOPE_EMBEDDING_MODEL", DEFAULT_MODEL.to_string())?,
            base_url: env_or(&lookup, "DASHSCOPE_BASE_URL", DEFAULT_BASE_URL.to_string())?,
            dimension: env_or(&lookup, "KB_VECTOR_DIM", 1024)?,
            timeout_secs: env_or(&lookup, "DASHSCOPE_TIMEOUT_SECS", 60)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration with explicit values
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            dimension: 1024,
            timeout_secs: 60,
        }
    }

    /// Reject blank or placeholder credentials before any request is made
    pub fn validate(&self) -> Result<()> {
        let key = self.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_KEY {
            return Err(Error::Configuration(
                "DashScope API key is not configured; set DASHSCOPE_API_KEY".to_string(),
            ));
        }
        if self.dimension == 0 {
            return Err(Error::Configuration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// API key with the middle elided, for logs
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() > 12 {
            let head: String = chars[..8].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            "***".to_string()
        }
    }
}
