//! Milvus integration for kb
//!
//! This crate provides the Milvus implementation of the VectorStore trait,
//! speaking the RESTful v2 API.

mod client;
mod config;
mod wire;


pub use client::MilvusVectorStore;
pub use config::MilvusConfig;

// Re-export core types for convenience
pub use kb_core::{Error, Result, VectorStore};
