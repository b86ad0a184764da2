//! Version-qualified embedding cache
//!
//! Strict LRU keyed by policy id. A lookup hits only when policy hash and
//! model version both match and the entry is unexpired; a mismatch on
//! either evicts the entry, since the stored vector can never be valid
//! again for that policy.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Embedding cache configuration
#[derive(Debug, Clone)]
pub struct EmbeddingCacheConfig {
    /// Maximum number of cached embeddings
    pub capacity: usize,

    /// Absolute time-to-live per entry
    pub ttl: Duration,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// A cached policy embedding
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    /// SHA-256 hex of the policy text the vector was computed from
    pub policy_hash: String,

    /// Model version the vector was computed with
    pub model_version: String,

    /// The embedding vector
    pub vector: Vec<f32>,

    /// Unix seconds when the vector was generated
    pub generated_at: u64,

    /// Number of cache hits served from this entry
    pub access_count: u64,

    /// Unix seconds of the last hit
    pub last_access: u64,
}

struct TimedEntry {
    embedding: CachedEmbedding,
    cached_at: Instant,
}

/// Embedding cache statistics
#[derive(Debug, Clone)]
pub struct EmbeddingCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,

    /// Entries ever stored, including replaced and evicted ones
    pub total_stored: u64,

    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
    pub ttl: Duration,
}

struct CacheState {
    entries: LruCache<String, TimedEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    total_stored: u64,
}

/// LRU + TTL cache over policy embeddings
pub struct EmbeddingCache {
    state: Mutex<CacheState>,
    config: EmbeddingCacheConfig,
}

impl EmbeddingCache {
    pub fn new(config: EmbeddingCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).expect("capacity is nonzero");
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                total_stored: 0,
            }),
            config,
        }
    }

    /// Version-qualified lookup
    ///
    /// Hits only when `(policy_id, policy_hash, model_version)` all match
    /// and the entry is unexpired. Hash or version mismatch evicts the
    /// entry and counts a miss.
    pub fn get_with_version(
        &self,
        policy_id: &str,
        policy_hash: &str,
        model_version: &str,
    ) -> Option<CachedEmbedding> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        let matched = match state.entries.get(policy_id) {
            Some(entry) => {
                if entry.cached_at.elapsed() > self.config.ttl {
                    Some(false)
                } else {
                    Some(
                        entry.embedding.policy_hash == policy_hash
                            && entry.embedding.model_version == model_version,
                    )
                }
            }
            None => None,
        };

        match matched {
            Some(true) => {
                let entry = state.entries.get_mut(policy_id).expect("entry present");
                entry.embedding.access_count += 1;
                entry.embedding.last_access = unix_now();
                let embedding = entry.embedding.clone();
                state.hits += 1;
                Some(embedding)
            }
            Some(false) => {
                state.entries.pop(policy_id);
                state.evictions += 1;
                state.misses += 1;
                None
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store a fresh embedding, evicting the LRU entry at capacity
    pub fn put_with_version(
        &self,
        policy_id: &str,
        policy_hash: &str,
        model_version: &str,
        vector: Vec<f32>,
    ) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        let now = unix_now();
        let was_full = state.entries.len() == state.entries.cap().get();
        let replaced = state.entries.contains(policy_id);

        state.entries.put(
            policy_id.to_string(),
            TimedEntry {
                embedding: CachedEmbedding {
                    policy_hash: policy_hash.to_string(),
                    model_version: model_version.to_string(),
                    vector,
                    generated_at: now,
                    access_count: 0,
                    last_access: now,
                },
                cached_at: Instant::now(),
            },
        );

        if was_full && !replaced {
            state.evictions += 1;
        }
        state.total_stored += 1;
    }

    /// Drop every entry; statistics survive
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.entries.clear();
    }

    pub fn stats(&self) -> EmbeddingCacheStats {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let total = state.hits + state.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            state.hits as f64 / total as f64
        };

        EmbeddingCacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            total_stored: state.total_stored,
            hit_rate,
            size: state.entries.len(),
            capacity: state.entries.cap().get(),
            ttl: self.config.ttl,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
