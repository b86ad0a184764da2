//! Reference HNSW index
//!
//! In-memory hierarchical navigable small-world graph over cosine
//! similarity. Inserts sample a geometric level, link to the closest M
//! neighbors per layer and prune back-links; deletes are lazy (the node
//! keeps routing but is filtered from results).

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{SearchResult, VectorEntry, VectorError, VectorRecord, VectorStats, VectorStore};

/// HNSW construction and search parameters
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Fixed vector dimension
    pub dimension: usize,

    /// Max links per node per layer (layer 0 uses 2M)
    pub m: usize,

    /// Candidate list width during construction
    pub ef_construction: usize,

    /// Candidate list width during search
    pub ef_search: usize,

    /// Hard cap on sampled levels
    pub max_level: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_level: 16,
        }
    }
}

struct Node {
    id: String,
    vector: Vec<f32>,
    metadata: HashMap<String, Value>,
    /// Adjacency lists, one per layer up to the node's level
    neighbors: Vec<Vec<usize>>,
    deleted: bool,
}

impl Node {
    fn level(&self) -> usize {
        self.neighbors.len().saturating_sub(1)
    }
}

struct Inner {
    nodes: Vec<Node>,
    by_id: HashMap<String, usize>,
    entry: Option<usize>,
    closed: bool,
}

/// Distance-ordered heap entry; max-heap by distance
struct Candidate {
    dist: f32,
    idx: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.idx == other.idx
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| self.idx.cmp(&other.idx))
    }
}

/// In-memory HNSW vector index
pub struct HnswIndex {
    config: HnswConfig,
    inner: RwLock<Inner>,
    rng: Mutex<StdRng>,
    /// 1 / ln(M), the level-sampling normalizer
    level_norm: f64,
    last_insert: AtomicU64,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        let level_norm = 1.0 / (config.m.max(2) as f64).ln();
        Self {
            config,
            inner: RwLock::new(Inner {
                nodes: Vec::new(),
                by_id: HashMap::new(),
                entry: None,
                closed: false,
            }),
            rng: Mutex::new(StdRng::seed_from_u64(0x5eed)),
            level_norm,
            last_insert: AtomicU64::new(0),
        }
    }

    /// Index with defaults for the given dimension
    pub fn with_dimension(dimension: usize) -> Self {
        Self::new(HnswConfig::new(dimension))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn random_level(&self) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let uniform: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
        let level = (-uniform.ln() * self.level_norm) as usize;
        level.min(self.config.max_level)
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return 1.0;
        }
        1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
    }

    /// Greedy best-first search within one layer
    fn search_layer(
        inner: &Inner,
        query: &[f32],
        entry_points: &[usize],
        ef: usize,
        level: usize,
    ) -> Vec<(f32, usize)> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if ep < inner.nodes.len() && visited.insert(ep) {
                let dist = Self::cosine_distance(query, &inner.nodes[ep].vector);
                candidates.push(Reverse(Candidate { dist, idx: ep }));
                results.push(Candidate { dist, idx: ep });
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef && current.dist > worst.dist {
                    break;
                }
            }

            let node = &inner.nodes[current.idx];
            if level >= node.neighbors.len() {
                continue;
            }

            for &neighbor in &node.neighbors[level] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = Self::cosine_distance(query, &inner.nodes[neighbor].vector);
                let worst_dist = results.peek().map(|c| c.dist).unwrap_or(f32::MAX);
                if results.len() < ef || dist < worst_dist {
                    candidates.push(Reverse(Candidate { dist, idx: neighbor }));
                    results.push(Candidate { dist, idx: neighbor });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut sorted: Vec<(f32, usize)> =
            results.into_iter().map(|c| (c.dist, c.idx)).collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(CmpOrdering::Equal));
        sorted
    }

    fn insert_inner(
        &self,
        inner: &mut Inner,
        id: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) {
        // Upsert: retire the old node, insert fresh
        if let Some(old_idx) = inner.by_id.remove(id) {
            inner.nodes[old_idx].deleted = true;
        }

        let level = self.random_level();
        let new_idx = inner.nodes.len();

        // Plan links per layer before the node enters the graph
        let mut planned: Vec<Vec<(f32, usize)>> = vec![Vec::new(); level + 1];

        if let Some(entry) = inner.entry {
            let entry_level = inner.nodes[entry].level();
            let mut eps = vec![entry];

            // Greedy descent through layers above the node's level
            let mut layer = entry_level;
            while layer > level {
                let found = Self::search_layer(inner, &vector, &eps, 1, layer);
                if let Some(&(_, best)) = found.first() {
                    eps = vec![best];
                }
                if layer == 0 {
                    break;
                }
                layer -= 1;
            }

            // Collect candidates on every layer the node participates in
            let mut layer = level.min(entry_level);
            loop {
                let found =
                    Self::search_layer(inner, &vector, &eps, self.config.ef_construction, layer);
                eps = found.iter().map(|&(_, idx)| idx).collect();
                planned[layer] = found;
                if layer == 0 {
                    break;
                }
                layer -= 1;
            }
        }

        inner.nodes.push(Node {
            id: id.to_string(),
            vector,
            metadata,
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        inner.by_id.insert(id.to_string(), new_idx);

        // Wire bidirectional links, pruning overflowing back-links
        for (layer, candidates) in planned.iter().enumerate() {
            let m_max = if layer == 0 {
                self.config.m * 2
            } else {
                self.config.m
            };

            let selected: Vec<usize> = candidates
                .iter()
                .take(m_max)
                .map(|&(_, idx)| idx)
                .collect();
            inner.nodes[new_idx].neighbors[layer] = selected.clone();

            for neighbor in selected {
                let list = &mut inner.nodes[neighbor].neighbors[layer];
                if !list.contains(&new_idx) {
                    list.push(new_idx);
                }
                if inner.nodes[neighbor].neighbors[layer].len() > m_max {
                    let base = inner.nodes[neighbor].vector.clone();
                    let mut ranked: Vec<(f32, usize)> = inner.nodes[neighbor].neighbors[layer]
                        .iter()
                        .map(|&n| (Self::cosine_distance(&base, &inner.nodes[n].vector), n))
                        .collect();
                    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(CmpOrdering::Equal));
                    inner.nodes[neighbor].neighbors[layer] =
                        ranked.into_iter().take(m_max).map(|(_, n)| n).collect();
                }
            }
        }

        let entry_level = inner.entry.map(|e| inner.nodes[e].level());
        if entry_level.map_or(true, |el| level > el) {
            inner.entry = Some(new_idx);
        }

        self.last_insert.store(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            Ordering::Relaxed,
        );
    }

    fn check_open(inner: &Inner) -> Result<(), VectorError> {
        if inner.closed {
            return Err(VectorError::Store("index is closed".to_string()));
        }
        Ok(())
    }

    fn check_cancel(cancel: &CancellationToken) -> Result<(), VectorError> {
        if cancel.is_cancelled() {
            return Err(VectorError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for HnswIndex {
    async fn insert(
        &self,
        cancel: &CancellationToken,
        id: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), VectorError> {
        Self::check_cancel(cancel)?;
        self.check_dimension(&vector)?;

        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        Self::check_open(&inner)?;
        self.insert_inner(&mut inner, id, vector, metadata);
        debug!(id, "vector inserted");
        Ok(())
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorError> {
        Self::check_cancel(cancel)?;
        self.check_dimension(query)?;
        if k == 0 {
            return Err(VectorError::InvalidQuery("k must be positive".to_string()));
        }

        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Self::check_open(&inner)?;

        let Some(entry) = inner.entry else {
            return Ok(Vec::new());
        };

        let mut eps = vec![entry];
        let mut layer = inner.nodes[entry].level();
        while layer > 0 {
            let found = Self::search_layer(&inner, query, &eps, 1, layer);
            if let Some(&(_, best)) = found.first() {
                eps = vec![best];
            }
            layer -= 1;
        }

        let ef = self.config.ef_search.max(k);
        let found = Self::search_layer(&inner, query, &eps, ef, 0);

        Ok(found
            .into_iter()
            .filter(|&(_, idx)| !inner.nodes[idx].deleted)
            .take(k)
            .map(|(dist, idx)| {
                let node = &inner.nodes[idx];
                SearchResult {
                    id: node.id.clone(),
                    score: 1.0 - dist,
                    distance: dist,
                    vector: node.vector.clone(),
                    metadata: node.metadata.clone(),
                }
            })
            .collect())
    }

    async fn delete(&self, cancel: &CancellationToken, id: &str) -> Result<(), VectorError> {
        Self::check_cancel(cancel)?;

        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        Self::check_open(&inner)?;

        match inner.by_id.remove(id) {
            Some(idx) => {
                inner.nodes[idx].deleted = true;
                Ok(())
            }
            None => Err(VectorError::NotFound(id.to_string())),
        }
    }

    async fn get(&self, cancel: &CancellationToken, id: &str) -> Result<VectorRecord, VectorError> {
        Self::check_cancel(cancel)?;

        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Self::check_open(&inner)?;

        inner
            .by_id
            .get(id)
            .map(|&idx| {
                let node = &inner.nodes[idx];
                VectorRecord {
                    id: node.id.clone(),
                    vector: node.vector.clone(),
                    metadata: node.metadata.clone(),
                }
            })
            .ok_or_else(|| VectorError::NotFound(id.to_string()))
    }

    async fn batch_insert(
        &self,
        cancel: &CancellationToken,
        entries: Vec<VectorEntry>,
    ) -> Result<(), VectorError> {
        for entry in entries {
            Self::check_cancel(cancel)?;
            self.insert(cancel, &entry.id, entry.vector, entry.metadata)
                .await?;
        }
        Ok(())
    }

    async fn stats(&self) -> VectorStats {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());

        let total_vectors = inner.nodes.iter().filter(|n| !n.deleted).count();
        let memory_usage_bytes: usize = inner
            .nodes
            .iter()
            .map(|n| {
                n.vector.len() * std::mem::size_of::<f32>()
                    + n.neighbors
                        .iter()
                        .map(|l| l.len() * std::mem::size_of::<usize>())
                        .sum::<usize>()
                    + n.id.len()
            })
            .sum();

        VectorStats {
            total_vectors,
            dimension: self.config.dimension,
            index_type: "hnsw".to_string(),
            memory_usage_bytes,
            last_insert_time: self.last_insert.load(Ordering::Relaxed),
        }
    }

    async fn close(&self) -> Result<(), VectorError> {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.closed = true;
        Ok(())
    }
}
