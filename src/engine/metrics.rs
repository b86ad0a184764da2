//! Metrics capability
//!
//! The core reports through this narrow interface; hosts plug in their own
//! exporter. Hot-path methods take pre-interned `&'static str` labels and
//! the built-in implementations never allocate on the record paths.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::types::Effect;

/// Outcome of one embedding job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingJobStatus {
    Completed,
    Failed,
    CacheHit,
    Rejected,
}

/// Narrow metrics interface the core calls into
///
/// Every method has a no-op default, so implementations override only what
/// they export.
pub trait Metrics: Send + Sync {
    fn record_check(&self, _effect: Effect, _duration: Duration) {}
    fn record_cache_hit(&self) {}
    fn record_cache_miss(&self) {}
    fn record_auth_error(&self, _kind: &'static str) {}
    fn inc_active_requests(&self) {}
    fn dec_active_requests(&self) {}
    fn record_embedding_job(&self, _status: EmbeddingJobStatus, _duration: Duration) {}
    fn record_cache_operation(&self, _op: &'static str) {}
    fn update_queue_depth(&self, _depth: usize) {}
    fn update_active_workers(&self, _workers: usize) {}
    fn update_cache_entries(&self, _entries: usize) {}
    fn record_vector_op(&self, _op: &'static str, _duration: Duration) {}
    fn record_vector_error(&self, _kind: &'static str) {}
    fn update_vector_store_size(&self, _size: usize) {}
    fn update_index_size(&self, _bytes: usize) {}
}

/// Metrics sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl Metrics for NoOpMetrics {}

/// Point-in-time view of the atomic collector
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub total_checks: u64,
    pub allowed: u64,
    pub denied: u64,
    pub total_check_duration_us: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub auth_errors: u64,
    pub active_requests: i64,
    pub embedding_jobs_completed: u64,
    pub embedding_jobs_failed: u64,
    pub embedding_cache_hits: u64,
    pub embedding_jobs_rejected: u64,
    pub vector_ops: u64,
    pub vector_errors: u64,
    pub queue_depth: u64,
    pub active_workers: u64,
    pub cache_entries: u64,
    pub vector_store_size: u64,
    pub index_size_bytes: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed + self.denied;
        if total == 0 {
            0.0
        } else {
            self.allowed as f64 / total as f64
        }
    }

    pub fn avg_check_duration_us(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.total_check_duration_us as f64 / self.total_checks as f64
        }
    }
}

/// In-memory collector backed entirely by atomics
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    total_checks: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    total_check_duration_us: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    auth_errors: AtomicU64,
    active_requests: AtomicI64,
    embedding_completed: AtomicU64,
    embedding_failed: AtomicU64,
    embedding_cache_hits: AtomicU64,
    embedding_rejected: AtomicU64,
    cache_operations: AtomicU64,
    vector_ops: AtomicU64,
    vector_errors: AtomicU64,
    queue_depth: AtomicU64,
    active_workers: AtomicU64,
    cache_entries: AtomicU64,
    vector_store_size: AtomicU64,
    index_size_bytes: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_checks: self.total_checks.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            total_check_duration_us: self.total_check_duration_us.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            auth_errors: self.auth_errors.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed),
            embedding_jobs_completed: self.embedding_completed.load(Ordering::Relaxed),
            embedding_jobs_failed: self.embedding_failed.load(Ordering::Relaxed),
            embedding_cache_hits: self.embedding_cache_hits.load(Ordering::Relaxed),
            embedding_jobs_rejected: self.embedding_rejected.load(Ordering::Relaxed),
            vector_ops: self.vector_ops.load(Ordering::Relaxed),
            vector_errors: self.vector_errors.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            cache_entries: self.cache_entries.load(Ordering::Relaxed),
            vector_store_size: self.vector_store_size.load(Ordering::Relaxed),
            index_size_bytes: self.index_size_bytes.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for AtomicMetrics {
    fn record_check(&self, effect: Effect, duration: Duration) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        match effect {
            Effect::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
            Effect::Deny => self.denied.fetch_add(1, Ordering::Relaxed),
        };
        self.total_check_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_auth_error(&self, _kind: &'static str) {
        self.auth_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_active_requests(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn dec_active_requests(&self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_embedding_job(&self, status: EmbeddingJobStatus, _duration: Duration) {
        match status {
            EmbeddingJobStatus::Completed => {
                self.embedding_completed.fetch_add(1, Ordering::Relaxed)
            }
            EmbeddingJobStatus::Failed => self.embedding_failed.fetch_add(1, Ordering::Relaxed),
            EmbeddingJobStatus::CacheHit => {
                self.embedding_cache_hits.fetch_add(1, Ordering::Relaxed)
            }
            EmbeddingJobStatus::Rejected => {
                self.embedding_rejected.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    fn record_cache_operation(&self, _op: &'static str) {
        self.cache_operations.fetch_add(1, Ordering::Relaxed);
    }

    fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth as u64, Ordering::Relaxed);
    }

    fn update_active_workers(&self, workers: usize) {
        self.active_workers.store(workers as u64, Ordering::Relaxed);
    }

    fn update_cache_entries(&self, entries: usize) {
        self.cache_entries.store(entries as u64, Ordering::Relaxed);
    }

    fn record_vector_op(&self, _op: &'static str, _duration: Duration) {
        self.vector_ops.fetch_add(1, Ordering::Relaxed);
    }

    fn record_vector_error(&self, _kind: &'static str) {
        self.vector_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn update_vector_store_size(&self, size: usize) {
        self.vector_store_size.store(size as u64, Ordering::Relaxed);
    }

    fn update_index_size(&self, bytes: usize) {
        self.index_size_bytes.store(bytes as u64, Ordering::Relaxed);
    }
}
