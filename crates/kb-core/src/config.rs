//! Configuration for chunking, collections, indexing and retrieval.
//!
//! Every struct has a `Default` for a single-node deployment and a
//! `from_env()` constructor. Parsing goes through `from_lookup` so it can be
//! exercised without touching the process environment.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, MetricType, Result};

/// Read `key` through `lookup`, falling back to `default` when unset or blank.
///
/// A value that is present but does not parse is an error rather than a
/// silent fallback.
pub fn env_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|e| {
            Error::Configuration(format!("invalid value '{}' for {}: {}", raw, key, e))
        }),
        _ => Ok(default),
    }
}

/// Lookup function over the process environment, after loading `.env`
pub fn process_env() -> impl Fn(&str) -> Option<String> {
    dotenvy::dotenv().ok();
    |key: &str| env::var(key).ok()
}

/// Chunk size policy, measured in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: 800,
            overlap: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_size: env_or(&lookup, "CHUNK_MAX_SIZE", defaults.max_size)?,
            overlap: env_or(&lookup, "CHUNK_OVERLAP", defaults.overlap)?,
        };

        if config.max_size == 0 {
            return Err(Error::Configuration(
                "CHUNK_MAX_SIZE must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Shape of the vector collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub dimension: usize,
    pub id_max_length: usize,
    pub content_max_length: usize,
    pub metric: MetricType,
    pub shards: u32,
    pub nlist: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: "biz".to_string(),
            dimension: 1024,
            id_max_length: 256,
            content_max_length: 8192,
            metric: MetricType::L2,
            shards: 2,
            nlist: 128,
        }
    }
}

impl CollectionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            name: env_or(&lookup, "KB_COLLECTION", defaults.name)?,
            dimension: env_or(&lookup, "KB_VECTOR_DIM", defaults.dimension)?,
            id_max_length: env_or(&lookup, "KB_ID_MAX_LENGTH", defaults.id_max_length)?,
            content_max_length: env_or(
                &lookup,
                "KB_CONTENT_MAX_LENGTH",
                defaults.content_max_length,
            )?,
            metric: env_or(&lookup, "KB_METRIC", defaults.metric)?,
            shards: env_or(&lookup, "KB_SHARDS", defaults.shards)?,
            nlist: env_or(&lookup, "KB_NLIST", defaults.nlist)?,
        };

        if config.dimension == 0 {
            return Err(Error::Configuration(
                "KB_VECTOR_DIM must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Indexer behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Directory indexed when no directory is given
    pub upload_dir: PathBuf,
    /// Extensions (without the dot, lowercase) eligible for directory indexing
    pub allowed_extensions: Vec<String>,
    pub embed_batch_size: usize,
    pub insert_batch_size: usize,
    pub call_timeout_secs: u64,
    /// Files indexed at once by `index_directory`; 1 is strictly sequential
    pub max_concurrent_files: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            allowed_extensions: vec!["txt".to_string(), "md".to_string()],
            embed_batch_size: 10,
            insert_batch_size: 100,
            call_timeout_secs: 30,
            max_concurrent_files: 1,
        }
    }
}

impl IndexingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let allowed_extensions = match lookup("UPLOAD_ALLOWED_EXTENSIONS") {
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            _ => defaults.allowed_extensions,
        };

        Ok(Self {
            upload_dir: env_or(&lookup, "UPLOAD_PATH", defaults.upload_dir)?,
            allowed_extensions,
            embed_batch_size: env_or(&lookup, "KB_EMBED_BATCH_SIZE", defaults.embed_batch_size)?
                .max(1),
            insert_batch_size: env_or(
                &lookup,
                "KB_INSERT_BATCH_SIZE",
                defaults.insert_batch_size,
            )?
            .max(1),
            call_timeout_secs: env_or(&lookup, "KB_CALL_TIMEOUT_SECS", defaults.call_timeout_secs)?,
            max_concurrent_files: env_or(
                &lookup,
                "KB_INDEX_CONCURRENCY",
                defaults.max_concurrent_files,
            )?
            .max(1),
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Whether a file name carries one of the allowed extensions
    pub fn is_allowed(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }
}

/// Retriever behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub nprobe: u32,
    pub call_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            nprobe: 10,
            call_timeout_secs: 30,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            top_k: env_or(&lookup, "RAG_TOP_K", defaults.top_k)?,
            nprobe: env_or(&lookup, "KB_NPROBE", defaults.nprobe)?,
            call_timeout_secs: env_or(&lookup, "KB_CALL_TIMEOUT_SECS", defaults.call_timeout_secs)?,
        };

        if config.top_k == 0 {
            return Err(Error::Configuration(
                "RAG_TOP_K must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let chunking = ChunkingConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(chunking, ChunkingConfig::default());

        let collection = CollectionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(collection.name, "biz");
        assert_eq!(collection.dimension, 1024);
        assert_eq!(collection.metric, MetricType::L2);

        let retrieval = RetrievalConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(retrieval.top_k, 3);
    }

    #[test]
    fn test_overrides() {
        let chunking = ChunkingConfig::from_lookup(lookup(&[
            ("CHUNK_MAX_SIZE", "1200"),
            ("CHUNK_OVERLAP", "0"),
        ]))
        .unwrap();
        assert_eq!(chunking.max_size, 1200);
        assert_eq!(chunking.overlap, 0);

        let collection = CollectionConfig::from_lookup(lookup(&[
            ("KB_COLLECTION", "runbooks"),
            ("KB_METRIC", "cosine"),
            ("KB_VECTOR_DIM", "768"),
        ]))
        .unwrap();
        assert_eq!(collection.name, "runbooks");
        assert_eq!(collection.metric, MetricType::Cosine);
        assert_eq!(collection.dimension, 768);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let err = ChunkingConfig::from_lookup(lookup(&[("CHUNK_MAX_SIZE", "big")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = ChunkingConfig::from_lookup(lookup(&[("CHUNK_MAX_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = RetrievalConfig::from_lookup(lookup(&[("RAG_TOP_K", "0")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_allowed_extensions() {
        let config = IndexingConfig::from_lookup(lookup(&[
            ("UPLOAD_ALLOWED_EXTENSIONS", " .MD, txt ,,rst"),
            ("UPLOAD_PATH", "/srv/docs"),
        ]))
        .unwrap();
        assert_eq!(config.allowed_extensions, vec!["md", "txt", "rst"]);
        assert_eq!(config.upload_dir, PathBuf::from("/srv/docs"));

        assert!(config.is_allowed("guide.md"));
        assert!(config.is_allowed("NOTES.TXT"));
        assert!(!config.is_allowed("image.png"));
        assert!(!config.is_allowed(".md"));
        assert!(!config.is_allowed("Makefile"));
    }

    #[test]
    fn test_batch_sizes_never_zero() {
        let config = IndexingConfig::from_lookup(lookup(&[
            ("KB_EMBED_BATCH_SIZE", "0"),
            ("KB_INSERT_BATCH_SIZE", "0"),
            ("KB_INDEX_CONCURRENCY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.embed_batch_size, 1);
        assert_eq!(config.insert_batch_size, 1);
        assert_eq!(config.max_concurrent_files, 1);
    }
}
