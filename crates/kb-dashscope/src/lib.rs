//! DashScope embedding integration for kb
//!
//! This crate provides the DashScope implementation of the EmbeddingProvider trait.

mod client;
mod config;

#[cfg(test)]
mod tests;

pub use client::DashScopeEmbedder;
pub use config::DashScopeConfig;

// Re-export core types for convenience
pub use kb_core::{EmbeddingProvider, Error, Result};
