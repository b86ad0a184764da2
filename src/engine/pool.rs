//! Bounded worker pool for rule evaluation
//!
//! Fixed-width pool consuming a buffered task queue (capacity N x 10).
//! `submit` applies backpressure by awaiting queue space; the decision
//! engine's dispatcher is the only caller and is itself bounded by the
//! action x policy product. A panicking task is caught and logged, never
//! taking a worker down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{AuthzError, Result};

/// A unit of work for the pool
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-width task pool with a bounded queue
pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    width: usize,
    panics: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawn a pool with `width` workers and a queue of `width * 10` tasks
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        let (sender, receiver) = mpsc::channel::<Task>(width * 10);
        let receiver = Arc::new(Mutex::new(receiver));
        let panics = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(width);
        for worker_id in 0..width {
            let receiver = Arc::clone(&receiver);
            let panics = Arc::clone(&panics);

            workers.push(tokio::spawn(async move {
                loop {
                    // The queue lock is held only while waiting for a task;
                    // execution happens outside it so workers run in parallel.
                    let task = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };

                    match task {
                        Some(task) => {
                            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                                panics.fetch_add(1, Ordering::Relaxed);
                                error!(worker_id, "worker task panicked; pool continues");
                            }
                        }
                        None => {
                            debug!(worker_id, "worker queue closed, exiting");
                            break;
                        }
                    }
                }
            }));
        }

        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            width,
            panics,
        }
    }

    /// Enqueue a task, waiting when the queue is full
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Internal` after `stop()` has closed the queue.
    pub async fn submit(&self, task: Task) -> Result<()> {
        let sender = {
            let guard = self
                .sender
                .lock()
                .map_err(|_| AuthzError::Internal("worker pool lock poisoned".to_string()))?;
            guard.clone()
        };

        match sender {
            Some(sender) => sender
                .send(task)
                .await
                .map_err(|_| AuthzError::Internal("worker pool stopped".to_string())),
            None => Err(AuthzError::Internal("worker pool stopped".to_string())),
        }
    }

    /// Close the queue and wait for workers to drain
    pub async fn stop(&self) {
        {
            let mut guard = match self.sender.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take();
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }

    /// Abort all workers without draining
    pub async fn abort(&self) {
        {
            let mut guard = match self.sender.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take();
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            handle.abort();
        }
    }

    /// Number of workers
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of task panics caught so far
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}
