//! Common types used across the kb pipeline

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A bounded slice of a document, the unit of embedding and retrieval.
///
/// `start_index`/`end_index` are character offsets into the source text and
/// are best effort once overlap seeding has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub start_index: usize,
    pub end_index: usize,
    pub chunk_index: usize,
    pub title: Option<String>,
}

impl Chunk {
    /// Number of characters in the chunk content
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Distance metric used by the vector store for ranking.
///
/// `L2` is lower-is-better; `COSINE` and `IP` are higher-is-better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    #[default]
    L2,
    Cosine,
    Ip,
}

impl MetricType {
    /// Whether a larger score means a closer match
    pub fn higher_is_better(self) -> bool {
        !matches!(self, MetricType::L2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::Cosine => "COSINE",
            MetricType::Ip => "IP",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L2" => Ok(MetricType::L2),
            "COSINE" => Ok(MetricType::Cosine),
            "IP" => Ok(MetricType::Ip),
            other => Err(Error::Configuration(format!(
                "unknown metric type '{}', expected L2, COSINE or IP",
                other
            ))),
        }
    }
}
