//! Vector index contract consumed by the embedding pipeline
//!
//! The engine only depends on this trait; the shipped [`HnswIndex`] is a
//! reference implementation using cosine similarity. Dimensions are fixed
//! at index creation and mismatched vectors are rejected.

pub mod hnsw;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use hnsw::{HnswConfig, HnswIndex};

/// Vector store operation errors
#[derive(Debug, Error, Clone)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector '{0}' not found")]
    NotFound(String),

    #[error("vector operation timed out")]
    Timeout,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("vector store error: {0}")]
    Store(String),
}

/// A stored vector with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, Value>,
}

/// One entry of a batch insert
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, Value>,
}

/// One k-NN search hit, ordered by descending similarity
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,

    /// Similarity score (cosine for the reference index)
    pub score: f32,

    /// Distance (1 - score for the reference index)
    pub distance: f32,

    pub vector: Vec<f32>,
    pub metadata: HashMap<String, Value>,
}

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct VectorStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub index_type: String,

    /// Rough in-memory footprint
    pub memory_usage_bytes: usize,

    /// Unix seconds of the last insert, 0 when never written
    pub last_insert_time: u64,
}

/// k-NN index contract
///
/// All operations accept a cancellation token; implementations should
/// observe it before starting expensive work.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a vector
    async fn insert(
        &self,
        cancel: &CancellationToken,
        id: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), VectorError>;

    /// Find the `k` nearest vectors, most similar first
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorError>;

    /// Remove a vector by id
    async fn delete(&self, cancel: &CancellationToken, id: &str) -> Result<(), VectorError>;

    /// Fetch a vector by id
    async fn get(&self, cancel: &CancellationToken, id: &str) -> Result<VectorRecord, VectorError>;

    /// Insert a batch of vectors
    async fn batch_insert(
        &self,
        cancel: &CancellationToken,
        entries: Vec<VectorEntry>,
    ) -> Result<(), VectorError>;

    /// Index statistics
    async fn stats(&self) -> VectorStats;

    /// Release resources; further calls may fail
    async fn close(&self) -> Result<(), VectorError>;
}
