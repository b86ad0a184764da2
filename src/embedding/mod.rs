//! Background policy-embedding pipeline
//!
//! Policies are serialized to a deterministic text form, hashed, embedded
//! through a pluggable embed function and upserted into the vector index
//! with version metadata. The pipeline never sits on the decision path:
//! submission is non-blocking and job failures only surface in stats.

pub mod cache;
pub mod change;
pub mod text;
pub mod worker;

use std::sync::Arc;

pub use cache::{CachedEmbedding, EmbeddingCache, EmbeddingCacheConfig, EmbeddingCacheStats};
pub use change::ChangeDetector;
pub use text::{hash_text, placeholder_embed_fn, policy_to_text};
pub use worker::{EmbeddingConfig, EmbeddingWorkerPool, EmbeddingWorkerStats};

/// Text embedding function: maps text to a fixed-dimension vector
pub type EmbedFn = Arc<dyn Fn(&str) -> anyhow::Result<Vec<f32>> + Send + Sync>;
