//! Milvus connection configuration

use serde::{Deserialize, Serialize};
use url::Url;

use kb_core::config::{env_or, process_env};
use kb_core::{Error, Result};

const DEFAULT_URI: &str = "http://localhost:19530";

/// Configuration for the Milvus REST client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilvusConfig {
    pub uri: String,
    /// Bearer token; `user:password` when built from credentials
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub database: String,
    pub timeout_secs: u64,
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            token: None,
            database: "default".to_string(),
            timeout_secs: 10,
        }
    }
}

impl MilvusConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let token = match lookup("MILVUS_TOKEN").filter(|t| !t.trim().is_empty()) {
            Some(token) => Some(token),
            None => match (lookup("MILVUS_USERNAME"), lookup("MILVUS_PASSWORD")) {
                (Some(user), Some(password)) if !user.trim().is_empty() => {
                    Some(format!("{}:{}", user, password))
                }
                _ => None,
            },
        };

        let config = Self {
            uri: env_or(&lookup, "MILVUS_URI", defaults.uri)?,
            token,
            database: env_or(&lookup, "MILVUS_DATABASE", defaults.database)?,
            timeout_secs: env_or(&lookup, "MILVUS_TIMEOUT_SECS", defaults.timeout_secs)?,
        };
        config.base_url()?;
        Ok(config)
    }

    /// Create configuration for a server URI with no credentials
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Root of the v2 REST API, always ending in a slash
    pub fn base_url(&self) -> Result<Url> {
        let mut uri = self.uri.trim().to_string();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        let base = Url::parse(&uri)
            .map_err(|e| Error::Configuration(format!("invalid MILVUS_URI '{}': {}", self.uri, e)))?;
        base.join("v2/vectordb/")
            .map_err(|e| Error::Configuration(e.to_string()))
    }
}
