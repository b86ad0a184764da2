//! Decision cache
//!
//! Maps a fingerprint of the request plus the policy-store epoch to the
//! complete response. Folding the epoch into the key means any store
//! mutation silently invalidates every cached decision. Entries expire on
//! an absolute TTL and are eagerly removed when read past expiry; overflow
//! evicts the least-recently-accessed tenth of the cache.

use blake3::Hasher;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::types::{CheckRequest, CheckResponse};

/// Decision cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached responses
    pub capacity: usize,

    /// Absolute time-to-live per entry
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}

type CacheKey = [u8; 32];

struct CachedEntry {
    response: CheckResponse,
    cached_at: Instant,
    last_access: AtomicU64,
}

/// Thread-safe decision cache with TTL and approximate-LRU eviction
///
/// Readers never block readers; access recency is tracked with a logical
/// clock so `get` stays lock-free.
pub struct DecisionCache {
    entries: DashMap<CacheKey, CachedEntry>,
    config: CacheConfig,
    access_clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl DecisionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            access_clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Fingerprint a request under a store epoch
    ///
    /// Covers the principal (id, sorted roles, scope, sorted attributes),
    /// the resource (kind, id, scope, sorted attributes), the sorted
    /// distinct actions and the epoch.
    pub fn compute_key(request: &CheckRequest, actions: &[String], epoch: u64) -> CacheKey {
        let mut hasher = Hasher::new();

        hasher.update(request.principal.id.as_bytes());
        hasher.update(&[0]);

        let mut roles = request.principal.roles.clone();
        roles.sort();
        roles.dedup();
        for role in &roles {
            hasher.update(role.as_bytes());
            hasher.update(&[0]);
        }

        hasher.update(request.principal.scope.as_bytes());
        hasher.update(&[0]);
        hash_attributes(&mut hasher, &request.principal.attributes);

        hasher.update(request.resource.kind.as_bytes());
        hasher.update(&[0]);
        hasher.update(request.resource.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(request.resource.scope.as_bytes());
        hasher.update(&[0]);
        hash_attributes(&mut hasher, &request.resource.attributes);

        let mut sorted_actions = actions.to_vec();
        sorted_actions.sort();
        for action in &sorted_actions {
            hasher.update(action.as_bytes());
            hasher.update(&[0]);
        }

        hash_attributes(&mut hasher, &request.context);

        hasher.update(&epoch.to_le_bytes());

        *hasher.finalize().as_bytes()
    }

    /// Look up a cached response
    ///
    /// Expired entries count as misses and are removed on the spot.
    pub fn get(&self, key: &CacheKey) -> Option<CheckResponse> {
        if let Some(entry) = self.entries.get(key) {
            if entry.cached_at.elapsed() > self.config.ttl {
                drop(entry);
                self.entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }

            let now = self.access_clock.fetch_add(1, Ordering::Relaxed);
            entry.last_access.store(now, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.response.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a response; last writer wins on the same key
    pub fn set(&self, key: CacheKey, response: CheckResponse) {
        if self.entries.len() >= self.config.capacity {
            self.evict_oldest();
        }

        let now = self.access_clock.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            CachedEntry {
                response,
                cached_at: Instant::now(),
                last_access: AtomicU64::new(now),
            },
        );
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.entries.len(),
            capacity: self.config.capacity,
        }
    }

    /// Remove the least-recently-accessed ~10% of entries
    fn evict_oldest(&self) {
        let target = (self.config.capacity / 10).max(1);

        let mut accesses: Vec<(CacheKey, u64)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.last_access.load(Ordering::Relaxed)))
            .collect();
        accesses.sort_by_key(|(_, access)| *access);

        for (key, _) in accesses.into_iter().take(target) {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn hash_attributes(hasher: &mut Hasher, attributes: &HashMap<String, serde_json::Value>) {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(&[0]);
        hasher.update(attributes[key].to_string().as_bytes());
        hasher.update(&[0]);
    }
}

/// Decision cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
