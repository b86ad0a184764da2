//! Policy change detection
//!
//! Tracks the last-observed content hash per policy and re-embeds only the
//! policies whose serialized text actually changed.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::text::{hash_text, policy_to_text};
use super::worker::EmbeddingWorkerPool;
use crate::error::Result;
use crate::policy::{Policy, PolicyStore};

/// Detects policy content changes against a remembered hash map
pub struct ChangeDetector {
    store: Arc<dyn PolicyStore>,
    worker: Arc<EmbeddingWorkerPool>,
    hashes: DashMap<String, String>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn PolicyStore>, worker: Arc<EmbeddingWorkerPool>) -> Self {
        Self {
            store,
            worker,
            hashes: DashMap::new(),
        }
    }

    /// Policies whose current hash differs from the remembered one
    ///
    /// Unknown ids are skipped; policies never seen before count as
    /// changed.
    pub async fn detect_changed_policies(&self, ids: &[String]) -> Result<Vec<Policy>> {
        let mut changed = Vec::new();

        for id in ids {
            let Some(policy) = self.store.get(id).await? else {
                continue;
            };

            let current_hash = hash_text(&policy_to_text(&policy));
            let is_changed = self
                .hashes
                .get(id)
                .map(|stored| *stored != current_hash)
                .unwrap_or(true);

            if is_changed {
                changed.push(policy);
            }
        }

        Ok(changed)
    }

    /// Remember the current hashes for the given policies
    ///
    /// Returns how many entries were written.
    pub fn update_policy_hashes(&self, policies: &[Policy]) -> usize {
        for policy in policies {
            let hash = hash_text(&policy_to_text(policy));
            self.hashes.insert(policy.name.clone(), hash);
        }
        policies.len()
    }

    /// Detect changes and submit each changed policy for re-embedding
    ///
    /// Returns how many jobs the queue accepted. Accepted policies get
    /// their hash remembered so the next sweep sees them as unchanged.
    pub async fn re_embed_changed_policies(&self, ids: &[String], priority: u8) -> Result<usize> {
        let changed = self.detect_changed_policies(ids).await?;

        let mut submitted = 0;
        for policy in &changed {
            if self.worker.submit_policy(policy, priority) {
                self.update_policy_hashes(std::slice::from_ref(policy));
                submitted += 1;
            }
        }

        debug!(
            changed = changed.len(),
            submitted, "re-embedding sweep finished"
        );
        Ok(submitted)
    }

    /// Number of remembered hashes
    pub fn tracked_count(&self) -> usize {
        self.hashes.len()
    }
}
