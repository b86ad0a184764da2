//! Embedding worker pool
//!
//! N workers drain a bounded queue of embedding jobs. Submission never
//! blocks: a full queue rejects the job and the caller moves on. Each job
//! hashes its text, consults the version-qualified cache, embeds on a miss
//! and upserts the vector with version metadata.

use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cache::{EmbeddingCache, EmbeddingCacheConfig};
use super::text::{hash_text, placeholder_embed_fn, policy_to_text};
use super::EmbedFn;
use crate::engine::metrics::{EmbeddingJobStatus, Metrics, NoOpMetrics};
use crate::error::{AuthzError, Result};
use crate::policy::Policy;
use crate::vector::{VectorRecord, VectorStore};

/// Maximum model-version string length
const MAX_VERSION_LEN: usize = 200;

/// Embedding pipeline configuration
#[derive(Clone)]
pub struct EmbeddingConfig {
    /// Number of worker tasks
    pub num_workers: usize,

    /// Bounded queue capacity
    pub queue_size: usize,

    /// Vector dimension produced by the embed function
    pub dimension: usize,

    /// Model version stamped into vector metadata and cache entries
    pub model_version: String,

    /// Embedding function; the deterministic placeholder when absent
    pub embed_fn: Option<EmbedFn>,

    /// Embedding cache configuration; no cache when absent
    pub cache: Option<EmbeddingCacheConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_size: 1000,
            dimension: 384,
            model_version: "v1".to_string(),
            embed_fn: None,
            cache: Some(EmbeddingCacheConfig::default()),
        }
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("num_workers", &self.num_workers)
            .field("queue_size", &self.queue_size)
            .field("dimension", &self.dimension)
            .field("model_version", &self.model_version)
            .field("embed_fn", &self.embed_fn.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Validate a model-version string: non-empty, at most 200 chars,
/// `[A-Za-z0-9._-]+`
pub fn validate_model_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(AuthzError::InvalidRequest(format!(
            "model version must be 1..={} characters",
            MAX_VERSION_LEN
        )));
    }

    let allowed = Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex");
    if !allowed.is_match(version) {
        return Err(AuthzError::InvalidRequest(format!(
            "model version '{}' contains invalid characters",
            version
        )));
    }

    Ok(())
}

/// One queued embedding job
#[derive(Debug, Clone)]
struct EmbeddingJob {
    policy_id: String,
    text: String,
    /// Carried for observability; the queue itself is FIFO
    priority: u8,
}

/// Worker pool statistics
#[derive(Debug, Clone, Default)]
pub struct EmbeddingWorkerStats {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub total_duration: Duration,
    pub avg_duration: Duration,
    pub queue_depth: usize,
    pub workers_active: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

#[derive(Default)]
struct SharedCounters {
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_duration_us: AtomicU64,
    workers_active: AtomicU64,
}

struct WorkerContext {
    model_version: String,
    dimension: usize,
    embed_fn: EmbedFn,
    cache: Option<Arc<EmbeddingCache>>,
    vector_store: Arc<dyn VectorStore>,
    metrics: Arc<dyn Metrics>,
    counters: SharedCounters,
    shutdown: CancellationToken,
}

impl WorkerContext {
    async fn process(&self, job: EmbeddingJob) {
        let start = Instant::now();
        let active = self.counters.workers_active.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.update_active_workers(active as usize);

        self.process_inner(&job).await;

        let active = self.counters.workers_active.fetch_sub(1, Ordering::Relaxed) - 1;
        self.metrics.update_active_workers(active as usize);
        self.counters
            .total_duration_us
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
    }

    async fn process_inner(&self, job: &EmbeddingJob) {
        let start = Instant::now();
        let policy_hash = hash_text(&job.text);

        if let Some(cache) = &self.cache {
            if cache
                .get_with_version(&job.policy_id, &policy_hash, &self.model_version)
                .is_some()
            {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.counters.jobs_processed.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .record_embedding_job(EmbeddingJobStatus::CacheHit, start.elapsed());
                debug!(policy_id = %job.policy_id, "embedding served from cache");
                return;
            }
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let vector = match (self.embed_fn)(&job.text) {
            Ok(vector) if vector.len() == self.dimension => vector,
            Ok(vector) => {
                warn!(
                    policy_id = %job.policy_id,
                    expected = self.dimension,
                    actual = vector.len(),
                    "embed function returned wrong dimension"
                );
                self.fail(start);
                return;
            }
            Err(e) => {
                warn!(policy_id = %job.policy_id, error = %e, "embedding failed");
                self.fail(start);
                return;
            }
        };

        if let Some(cache) = &self.cache {
            cache.put_with_version(&job.policy_id, &policy_hash, &self.model_version, vector.clone());
        }

        let mut metadata = HashMap::new();
        metadata.insert("policy_id".to_string(), json!(job.policy_id));
        metadata.insert("embedded_at".to_string(), json!(unix_now()));
        metadata.insert("text_length".to_string(), json!(job.text.len()));
        metadata.insert("policy_hash".to_string(), json!(policy_hash));
        metadata.insert("model_version".to_string(), json!(self.model_version));

        let insert_start = Instant::now();
        match self
            .vector_store
            .insert(&self.shutdown, &job.policy_id, vector, metadata)
            .await
        {
            Ok(()) => {
                self.metrics.record_vector_op("insert", insert_start.elapsed());
                let stats = self.vector_store.stats().await;
                self.metrics.update_vector_store_size(stats.total_vectors);
                self.metrics.update_index_size(stats.memory_usage_bytes);

                self.counters.jobs_processed.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .record_embedding_job(EmbeddingJobStatus::Completed, start.elapsed());
                debug!(policy_id = %job.policy_id, priority = job.priority, "policy embedded");
            }
            Err(e) => {
                warn!(policy_id = %job.policy_id, error = %e, "vector insert failed");
                self.metrics.record_vector_error("insert");
                self.fail(start);
            }
        }
    }

    fn fail(&self, start: Instant) {
        self.counters.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_embedding_job(EmbeddingJobStatus::Failed, start.elapsed());
    }
}

/// Bounded-queue embedding worker pool
pub struct EmbeddingWorkerPool {
    context: Arc<WorkerContext>,
    sender: mpsc::Sender<EmbeddingJob>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    queue_size: usize,
    num_workers: usize,
}

impl EmbeddingWorkerPool {
    /// Start the pool
    ///
    /// # Errors
    ///
    /// Fails when the model version is invalid.
    pub fn new(
        config: EmbeddingConfig,
        vector_store: Arc<dyn VectorStore>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self> {
        validate_model_version(&config.model_version)?;

        let num_workers = config.num_workers.max(1);
        let queue_size = config.queue_size.max(1);

        let embed_fn = config
            .embed_fn
            .unwrap_or_else(|| placeholder_embed_fn(config.dimension));
        let cache = config.cache.map(|c| Arc::new(EmbeddingCache::new(c)));

        let context = Arc::new(WorkerContext {
            model_version: config.model_version,
            dimension: config.dimension,
            embed_fn,
            cache,
            vector_store,
            metrics,
            counters: SharedCounters::default(),
            shutdown: CancellationToken::new(),
        });

        let (sender, receiver) = mpsc::channel::<EmbeddingJob>(queue_size);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let receiver = Arc::clone(&receiver);
            let context = Arc::clone(&context);

            workers.push(tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        biased;
                        _ = context.shutdown.cancelled() => break,
                        job = async {
                            let mut rx = receiver.lock().await;
                            rx.recv().await
                        } => job,
                    };

                    match job {
                        Some(job) => context.process(job).await,
                        None => break,
                    }
                }
                debug!(worker_id, "embedding worker exited");
            }));
        }

        Ok(Self {
            context,
            sender,
            workers: Mutex::new(workers),
            queue_size,
            num_workers,
        })
    }

    /// Pool with defaults and the given vector store
    pub fn with_defaults(vector_store: Arc<dyn VectorStore>) -> Result<Self> {
        Self::new(
            EmbeddingConfig::default(),
            vector_store,
            Arc::new(NoOpMetrics),
        )
    }

    /// Enqueue an embedding job
    ///
    /// Non-blocking; returns `false` when the queue is full or the pool is
    /// shutting down. Overflow bumps no job counters.
    pub fn submit(&self, policy_id: &str, text: &str, priority: u8) -> bool {
        if self.context.shutdown.is_cancelled() {
            return false;
        }

        let job = EmbeddingJob {
            policy_id: policy_id.to_string(),
            text: text.to_string(),
            priority,
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                self.context.metrics.update_queue_depth(self.queue_depth());
                true
            }
            Err(_) => {
                self.context
                    .metrics
                    .record_embedding_job(EmbeddingJobStatus::Rejected, Duration::ZERO);
                false
            }
        }
    }

    /// Serialize a policy and submit it
    pub fn submit_policy(&self, policy: &Policy, priority: u8) -> bool {
        self.submit(&policy.name, &policy_to_text(policy), priority)
    }

    /// Submit a batch of policies; returns how many were accepted
    pub fn submit_batch(&self, policies: &[Policy], priority: u8) -> usize {
        policies
            .iter()
            .filter(|p| self.submit_policy(p, priority))
            .count()
    }

    /// Synchronous embedding for query-side callers
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector =
            (self.context.embed_fn)(text).map_err(|e| AuthzError::Internal(e.to_string()))?;
        if vector.len() != self.context.dimension {
            return Err(AuthzError::Internal(format!(
                "embed function returned {} dimensions, expected {}",
                vector.len(),
                self.context.dimension
            )));
        }
        Ok(vector)
    }

    /// Whether a stored record was embedded with a different model version
    ///
    /// Missing metadata is treated as legacy, not a mismatch.
    pub fn detect_version_mismatch(&self, record: &VectorRecord) -> bool {
        match record.metadata.get("model_version").and_then(|v| v.as_str()) {
            Some(version) => version != self.context.model_version,
            None => false,
        }
    }

    /// Model version this pool stamps on its work
    pub fn model_version(&self) -> &str {
        &self.context.model_version
    }

    /// Embedding cache handle, when configured
    pub fn cache(&self) -> Option<&Arc<EmbeddingCache>> {
        self.context.cache.as_ref()
    }

    /// Jobs currently waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.queue_size - self.sender.capacity()
    }

    /// Stop accepting work and drain the workers
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` after force-cancelling workers that did
    /// not drain within the deadline.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        self.context.shutdown.cancel();

        let mut workers = self.workers.lock().await;
        let drain = async {
            for handle in workers.drain(..) {
                let _ = handle.await;
            }
        };

        match timeout(deadline, drain).await {
            Ok(()) => Ok(()),
            Err(_) => {
                for handle in workers.drain(..) {
                    handle.abort();
                }
                Err(AuthzError::DeadlineExceeded)
            }
        }
    }

    pub fn stats(&self) -> EmbeddingWorkerStats {
        let counters = &self.context.counters;
        let processed = counters.jobs_processed.load(Ordering::Relaxed);
        let failed = counters.jobs_failed.load(Ordering::Relaxed);
        let cache_hits = counters.cache_hits.load(Ordering::Relaxed);
        let cache_misses = counters.cache_misses.load(Ordering::Relaxed);
        let total_us = counters.total_duration_us.load(Ordering::Relaxed);

        let completed = processed + failed;
        let avg_duration = if completed == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(total_us / completed)
        };
        let lookups = cache_hits + cache_misses;
        let cache_hit_rate = if lookups == 0 {
            0.0
        } else {
            cache_hits as f64 / lookups as f64
        };

        EmbeddingWorkerStats {
            jobs_processed: processed,
            jobs_failed: failed,
            total_duration: Duration::from_micros(total_us),
            avg_duration,
            queue_depth: self.queue_depth(),
            workers_active: counters.workers_active.load(Ordering::Relaxed) as usize,
            cache_hits,
            cache_misses,
            cache_hit_rate,
        }
    }

    /// Number of worker tasks
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::HnswIndex;

    fn pool_with(config: EmbeddingConfig) -> (EmbeddingWorkerPool, Arc<HnswIndex>) {
        let index = Arc::new(HnswIndex::with_dimension(config.dimension));
        let pool = EmbeddingWorkerPool::new(config, index.clone(), Arc::new(NoOpMetrics)).unwrap();
        (pool, index)
    }

    async fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_version_validation() {
        assert!(validate_model_version("v1").is_ok());
        assert!(validate_model_version("model-2024.06_beta").is_ok());
        assert!(validate_model_version("").is_err());
        assert!(validate_model_version("has space").is_err());
        assert!(validate_model_version(&"x".repeat(201)).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_job_embeds_and_upserts() {
        let (pool, index) = pool_with(EmbeddingConfig {
            dimension: 16,
            ..Default::default()
        });

        assert!(pool.submit("policy-1", "Policy: policy-1", 0));
        wait_for(|| pool.stats().jobs_processed == 1).await;

        let cancel = CancellationToken::new();
        let record = index.get(&cancel, "policy-1").await.unwrap();
        assert_eq!(record.vector.len(), 16);
        assert_eq!(
            record.metadata.get("model_version"),
            Some(&json!("v1"))
        );
        assert_eq!(
            record.metadata.get("policy_hash"),
            Some(&json!(hash_text("Policy: policy-1")))
        );
        assert!(record.metadata.contains_key("embedded_at"));
        assert_eq!(record.metadata.get("text_length"), Some(&json!(16)));

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resubmit_hits_cache() {
        let (pool, _index) = pool_with(EmbeddingConfig {
            dimension: 16,
            ..Default::default()
        });

        assert!(pool.submit("p", "same text", 0));
        wait_for(|| pool.stats().jobs_processed == 1).await;

        assert!(pool.submit("p", "same text", 0));
        wait_for(|| pool.stats().jobs_processed == 2).await;

        let stats = pool.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.cache_hit_rate - 0.5).abs() < f64::EPSILON);

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queue_overflow_returns_false() {
        let gate = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let gate_worker = Arc::clone(&gate);

        let embed_fn: EmbedFn = Arc::new(move |_text| {
            while !gate_worker.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(vec![1.0, 0.0])
        });

        let (pool, _index) = pool_with(EmbeddingConfig {
            num_workers: 1,
            queue_size: 1,
            dimension: 2,
            embed_fn: Some(embed_fn),
            ..Default::default()
        });

        // First job occupies the worker
        assert!(pool.submit("a", "a", 0));
        wait_for(|| pool.stats().workers_active == 1).await;

        // Second fills the queue; the rest are rejected without counting
        assert!(pool.submit("b", "b", 0));
        assert!(!pool.submit("c", "c", 0));
        assert!(!pool.submit("d", "d", 0));

        let stats = pool.stats();
        assert_eq!(stats.jobs_processed, 0);
        assert_eq!(stats.jobs_failed, 0);

        gate.store(true, Ordering::SeqCst);
        wait_for(|| pool.stats().jobs_processed == 2).await;

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_embed_failure_counts_failed() {
        let embed_fn: EmbedFn = Arc::new(|_text| anyhow::bail!("model unavailable"));

        let (pool, _index) = pool_with(EmbeddingConfig {
            dimension: 2,
            embed_fn: Some(embed_fn),
            ..Default::default()
        });

        assert!(pool.submit("p", "text", 0));
        wait_for(|| pool.stats().jobs_failed == 1).await;
        assert_eq!(pool.stats().jobs_processed, 0);

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_version_upgrade_restamps_metadata() {
        let index = Arc::new(HnswIndex::with_dimension(16));
        let text = "Policy: stable text";

        let pool_v1 = EmbeddingWorkerPool::new(
            EmbeddingConfig {
                dimension: 16,
                model_version: "v1".to_string(),
                ..Default::default()
            },
            index.clone(),
            Arc::new(NoOpMetrics),
        )
        .unwrap();
        assert!(pool_v1.submit("p", text, 0));
        wait_for(|| pool_v1.stats().jobs_processed == 1).await;
        pool_v1.shutdown(Duration::from_secs(2)).await.unwrap();

        let cancel = CancellationToken::new();
        let record_v1 = index.get(&cancel, "p").await.unwrap();
        assert_eq!(record_v1.metadata.get("model_version"), Some(&json!("v1")));

        let pool_v2 = EmbeddingWorkerPool::new(
            EmbeddingConfig {
                dimension: 16,
                model_version: "v2".to_string(),
                ..Default::default()
            },
            index.clone(),
            Arc::new(NoOpMetrics),
        )
        .unwrap();

        assert!(pool_v2.detect_version_mismatch(&record_v1));

        assert!(pool_v2.submit("p", text, 0));
        wait_for(|| pool_v2.stats().jobs_processed == 1).await;

        let record_v2 = index.get(&cancel, "p").await.unwrap();
        assert_eq!(record_v2.metadata.get("model_version"), Some(&json!("v2")));
        // Same text, same content hash
        assert_eq!(
            record_v2.metadata.get("policy_hash"),
            record_v1.metadata.get("policy_hash")
        );
        assert!(!pool_v2.detect_version_mismatch(&record_v2));

        pool_v2.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_missing_version_metadata_is_legacy() {
        let (pool, _index) = pool_with(EmbeddingConfig {
            dimension: 2,
            ..Default::default()
        });

        let record = VectorRecord {
            id: "legacy".to_string(),
            vector: vec![1.0, 0.0],
            metadata: HashMap::new(),
        };
        assert!(!pool.detect_version_mismatch(&record));

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sync_embed() {
        let (pool, _index) = pool_with(EmbeddingConfig {
            dimension: 32,
            ..Default::default()
        });

        let vector = pool.embed("query text").unwrap();
        assert_eq!(vector.len(), 32);
        assert_eq!(vector, pool.embed("query text").unwrap());

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submit_after_shutdown_is_rejected() {
        let (pool, _index) = pool_with(EmbeddingConfig {
            dimension: 2,
            ..Default::default()
        });

        pool.shutdown(Duration::from_secs(2)).await.unwrap();
        assert!(!pool.submit("p", "text", 0));
    }

    #[test]
    fn test_invalid_version_rejected_at_construction() {
        let index: Arc<dyn VectorStore> = Arc::new(HnswIndex::with_dimension(2));
        let result = EmbeddingWorkerPool::new(
            EmbeddingConfig {
                model_version: "not valid!".to_string(),
                ..Default::default()
            },
            index,
            Arc::new(NoOpMetrics),
        );
        assert!(result.is_err());
    }
}
