//! Decision engine
//!
//! Orchestrates a check: cache probe, derived-role expansion,
//! principal-first policy selection, hierarchical scope resolution,
//! parallel rule evaluation, priority merge and response assembly.
//!
//! ```text
//! Check -> [decision cache] -> derived roles -> tier selection
//!             -> (action x policy) fan-out on the worker pool
//!             -> priority merge (principal > role > resource, deny wins)
//!             -> metadata -> cache insert
//! ```

pub mod cache;
pub mod metrics;
pub mod pool;

pub use cache::{CacheConfig, CacheStats, DecisionCache};
pub use metrics::{
    AtomicMetrics, EmbeddingJobStatus, Metrics, MetricsSnapshot, NoOpMetrics,
};
pub use pool::WorkerPool;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cel::{CelEngine, EvalContext};
use crate::derived_roles::DerivedRoleResolver;
use crate::embedding::{EmbeddingConfig, EmbeddingWorkerPool};
use crate::error::{AuthzError, Result};
use crate::policy::{Policy, PolicyStore};
use crate::scope::{ScopeConfig, ScopeResolver};
use crate::types::{
    ActionResult, CheckRequest, CheckResponse, Effect, PolicyResolution, ResponseMetadata,
    ScopeResolution,
};
use crate::vector::{SearchResult, VectorStore};

/// Engine construction options
#[derive(Clone)]
pub struct EngineConfig {
    /// Gate the decision cache
    pub cache_enabled: bool,

    /// Decision cache capacity
    pub cache_size: usize,

    /// Decision cache entry lifetime
    pub cache_ttl: Duration,

    /// Worker-pool width for rule evaluation
    pub parallel_workers: usize,

    /// Closed-world fallback when no rule matches
    pub default_effect: Effect,

    /// When false, vector calls are no-ops returning empty results
    pub vector_similarity_enabled: bool,

    /// Vector index for policy embeddings
    pub vector_store: Option<Arc<dyn VectorStore>>,

    /// Background embedding pipeline; requires a vector store
    pub embedding: Option<EmbeddingConfig>,

    /// Metrics sink; NoOp when absent
    pub metrics: Option<Arc<dyn Metrics>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_size: 10_000,
            cache_ttl: Duration::from_secs(60),
            parallel_workers: num_cpus::get(),
            default_effect: Effect::Deny,
            vector_similarity_enabled: false,
            vector_store: None,
            embedding: None,
            metrics: None,
        }
    }
}

/// Tier indices in strict priority order
const TIER_COUNT: usize = 3;

/// Result of evaluating one policy for one action
struct PolicyOutcome {
    action_idx: usize,
    tier: usize,
    policy_idx: usize,
    deny: Option<(String, String)>,
    allow: Option<(String, String)>,
}

/// Policy-based authorization decision engine
pub struct DecisionEngine {
    store: Arc<dyn PolicyStore>,
    cel: Arc<CelEngine>,
    scope_resolver: ScopeResolver,
    role_resolver: DerivedRoleResolver,
    cache: Option<DecisionCache>,
    pool: WorkerPool,
    embedding: Option<Arc<EmbeddingWorkerPool>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    metrics: Arc<dyn Metrics>,
    default_effect: Effect,
    vector_similarity_enabled: bool,
}

impl DecisionEngine {
    /// Build an engine over a policy store
    ///
    /// # Errors
    ///
    /// Fails when the embedding configuration is present without a vector
    /// store, or when it is itself invalid.
    pub fn new(config: EngineConfig, store: Arc<dyn PolicyStore>) -> Result<Self> {
        let metrics: Arc<dyn Metrics> = config
            .metrics
            .unwrap_or_else(|| Arc::new(NoOpMetrics));

        let cel = Arc::new(CelEngine::new());
        let role_resolver = DerivedRoleResolver::new(Arc::clone(&cel));

        let cache = config.cache_enabled.then(|| {
            DecisionCache::new(CacheConfig {
                capacity: config.cache_size,
                ttl: config.cache_ttl,
            })
        });

        let embedding = match config.embedding {
            Some(embedding_config) => {
                let vector_store = config.vector_store.clone().ok_or_else(|| {
                    AuthzError::Internal(
                        "embedding configured without a vector store".to_string(),
                    )
                })?;
                Some(Arc::new(EmbeddingWorkerPool::new(
                    embedding_config,
                    vector_store,
                    Arc::clone(&metrics),
                )?))
            }
            None => None,
        };

        info!(
            cache = config.cache_enabled,
            workers = config.parallel_workers,
            default_effect = config.default_effect.as_str(),
            "decision engine initialized"
        );

        Ok(Self {
            store,
            cel,
            scope_resolver: ScopeResolver::new(ScopeConfig::default()),
            role_resolver,
            cache,
            pool: WorkerPool::new(config.parallel_workers),
            embedding,
            vector_store: config.vector_store,
            metrics,
            default_effect: config.default_effect,
            vector_similarity_enabled: config.vector_similarity_enabled,
        })
    }

    /// Authorize every action in the request
    ///
    /// Returns one result per distinct action; actions nothing matched get
    /// the default effect with `matched=false`.
    pub async fn check(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> Result<CheckResponse> {
        request.validate().map_err(AuthzError::InvalidRequest)?;
        if cancel.is_cancelled() {
            return Err(AuthzError::Cancelled);
        }

        self.metrics.inc_active_requests();
        let result = self.check_inner(request, cancel).await;
        self.metrics.dec_active_requests();
        result
    }

    async fn check_inner(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> Result<CheckResponse> {
        let start = Instant::now();

        let request_id = if request.request_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.request_id.clone()
        };

        // Distinct actions, request order preserved
        let mut seen = HashSet::new();
        let actions: Vec<String> = request
            .actions
            .iter()
            .filter(|a| seen.insert(a.as_str()))
            .cloned()
            .collect();

        let epoch = self.store.epoch();
        let key = DecisionCache::compute_key(request, &actions, epoch);

        if let Some(cache) = &self.cache {
            if let Some(mut response) = cache.get(&key) {
                self.metrics.record_cache_hit();
                response.request_id = request_id;
                response.metadata.cache_hit = true;

                let elapsed = start.elapsed();
                for result in &response.results {
                    self.metrics.record_check(result.effect, elapsed);
                }
                debug!(request_id = %response.request_id, "decision served from cache");
                return Ok(response);
            }
            self.metrics.record_cache_miss();
        }

        // Derived-role expansion; resolver failure degrades to base roles
        let definitions = self.store.get_derived_roles().await?;
        let base_roles = &request.principal.roles;
        let (roles, derived_added) = if definitions.is_empty() {
            (base_roles.clone(), Vec::new())
        } else {
            match self
                .role_resolver
                .resolve(&definitions, &request.principal, &request.resource)
            {
                Ok(expanded) => {
                    let added: Vec<String> = expanded
                        .iter()
                        .filter(|r| !base_roles.contains(r))
                        .cloned()
                        .collect();
                    (expanded, added)
                }
                Err(e) => {
                    warn!(error = %e, "derived-role resolution failed; using base roles");
                    self.metrics.record_auth_error("derived_roles");
                    (base_roles.clone(), Vec::new())
                }
            }
        };

        if cancel.is_cancelled() {
            return Err(AuthzError::Cancelled);
        }

        // Three-bucket selection, principal-first
        let principal_tier = self
            .store
            .find_policies_by_principal(&request.principal.id, &request.resource.kind)
            .await?;
        let role_tier = self
            .store
            .find_policies_by_roles(&roles, &request.resource.kind)
            .await?;
        let (resource_tier, scope_resolution) =
            self.select_resource_policies(request, &actions).await?;

        let policy_resolution = PolicyResolution {
            principal_policies: principal_tier.len(),
            role_policies: role_tier.len(),
            resource_policies: resource_tier.len(),
        };

        // Principal policies must also pass their resource selectors
        let keep = |policies: Vec<Policy>| -> Vec<Arc<Policy>> {
            policies
                .into_iter()
                .filter(|p| !p.principal_policy || p.selectors_match(&request.resource))
                .map(Arc::new)
                .collect()
        };
        let tiers: [Vec<Arc<Policy>>; TIER_COUNT] = [
            keep(principal_tier),
            keep(role_tier),
            resource_tier.into_iter().map(Arc::new).collect(),
        ];

        if cancel.is_cancelled() {
            return Err(AuthzError::Cancelled);
        }

        let env = Arc::new(EvalContext::for_request(
            &request.principal,
            &roles,
            &request.resource,
            &request.context,
        ));
        let roles = Arc::new(roles);

        let outcomes = self.evaluate_tiers(&actions, &tiers, &env, &roles).await?;
        let results = self.merge_outcomes(&actions, &outcomes);

        let elapsed = start.elapsed();
        for result in &results {
            self.metrics.record_check(result.effect, elapsed);
        }

        debug!(
            request_id = %request_id,
            policies = policy_resolution.total(),
            duration_us = elapsed.as_micros() as u64,
            "check evaluated"
        );

        let response = CheckResponse {
            request_id,
            results,
            metadata: ResponseMetadata {
                evaluation_duration_us: elapsed.as_micros() as u64,
                policies_evaluated: policy_resolution.total(),
                cache_hit: false,
                derived_roles: derived_added,
                scope_resolution: Some(scope_resolution),
                policy_resolution,
            },
        };

        if let Some(cache) = &self.cache {
            cache.set(key, response.clone());
            self.metrics.record_cache_operation("set");
            self.metrics.update_cache_entries(cache.stats().size);
        }

        Ok(response)
    }

    /// Evaluate many requests concurrently, preserving input order
    ///
    /// Returns the first error observed; responses before it may still
    /// have been produced and cached.
    pub async fn check_batch(
        &self,
        requests: &[CheckRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<CheckResponse>> {
        let futures = requests.iter().map(|request| self.check(request, cancel));
        let results = futures::future::join_all(futures).await;

        let mut responses = Vec::with_capacity(results.len());
        for result in results {
            responses.push(result?);
        }
        Ok(responses)
    }

    /// Similarity search over embedded policies
    ///
    /// No-op returning empty results when vector similarity is disabled or
    /// not wired up.
    pub async fn find_similar_policies(
        &self,
        text: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        if !self.vector_similarity_enabled {
            return Ok(Vec::new());
        }
        let (Some(embedding), Some(vector_store)) = (&self.embedding, &self.vector_store) else {
            return Ok(Vec::new());
        };

        let query = embedding.embed(text)?;
        let search_start = Instant::now();
        let results = vector_store.search(cancel, &query, k).await?;
        self.metrics
            .record_vector_op("search", search_start.elapsed());
        Ok(results)
    }

    /// Drain the worker pool and embedding workers
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` after forcing cancellation when the
    /// deadline expires.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let deadline_at = Instant::now() + deadline;

        if timeout(deadline, self.pool.stop()).await.is_err() {
            self.pool.abort().await;
            if let Some(embedding) = &self.embedding {
                let _ = embedding.shutdown(Duration::from_millis(1)).await;
            }
            return Err(AuthzError::DeadlineExceeded);
        }

        if let Some(embedding) = &self.embedding {
            let remaining = deadline_at
                .saturating_duration_since(Instant::now())
                .max(Duration::from_millis(1));
            embedding.shutdown(remaining).await?;
        }

        Ok(())
    }

    /// Clear the decision cache and every derived cache
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        self.cel.clear_cache();
        self.scope_resolver.clear_cache();
        self.role_resolver.clear_cache();
        self.metrics.record_cache_operation("clear");
        self.metrics.update_cache_entries(0);
        info!("engine caches cleared");
    }

    /// Decision cache statistics; `None` when caching is disabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// The policy store backing this engine
    pub fn store(&self) -> Arc<dyn PolicyStore> {
        Arc::clone(&self.store)
    }

    /// The embedding pipeline, when configured
    pub fn embedding(&self) -> Option<&Arc<EmbeddingWorkerPool>> {
        self.embedding.as_ref()
    }

    async fn select_resource_policies(
        &self,
        request: &CheckRequest,
        actions: &[String],
    ) -> Result<(Vec<Policy>, ScopeResolution)> {
        let kind = &request.resource.kind;
        let effective_scope = if !request.resource.scope.is_empty() {
            request.resource.scope.clone()
        } else {
            request.principal.scope.clone()
        };

        if effective_scope.is_empty() {
            let global = self.store.find_policies_for_scope("", kind, actions).await?;
            return Ok((
                global,
                ScopeResolution {
                    requested_scope: String::new(),
                    chain: Vec::new(),
                    matched_scope: "(global)".to_string(),
                },
            ));
        }

        match self.scope_resolver.build_scope_chain(&effective_scope) {
            Ok(chain) => {
                // Most specific scope with any policies wins
                for scope in chain.iter() {
                    let found = self
                        .store
                        .find_policies_for_scope(scope, kind, actions)
                        .await?;
                    if !found.is_empty() {
                        debug!(scope = %scope, policies = found.len(), "scope matched");
                        return Ok((
                            found,
                            ScopeResolution {
                                requested_scope: effective_scope.clone(),
                                chain: chain.to_vec(),
                                matched_scope: scope.to_string(),
                            },
                        ));
                    }
                }

                let global = self.store.find_policies_for_scope("", kind, actions).await?;
                Ok((
                    global,
                    ScopeResolution {
                        requested_scope: effective_scope,
                        chain: chain.to_vec(),
                        matched_scope: "(global)".to_string(),
                    },
                ))
            }
            Err(e) => {
                warn!(scope = %effective_scope, error = %e, "invalid request scope; falling back to global policies");
                self.metrics.record_auth_error("invalid_scope");
                let global = self.store.find_policies_for_scope("", kind, actions).await?;
                Ok((
                    global,
                    ScopeResolution {
                        requested_scope: effective_scope,
                        chain: Vec::new(),
                        matched_scope: "(invalid)".to_string(),
                    },
                ))
            }
        }
    }

    /// Fan the action x policy product out onto the worker pool
    async fn evaluate_tiers(
        &self,
        actions: &[String],
        tiers: &[Vec<Arc<Policy>>; TIER_COUNT],
        env: &Arc<EvalContext>,
        roles: &Arc<Vec<String>>,
    ) -> Result<Vec<PolicyOutcome>> {
        let mut receivers = Vec::new();

        for (action_idx, action) in actions.iter().enumerate() {
            for (tier, policies) in tiers.iter().enumerate() {
                for (policy_idx, policy) in policies.iter().enumerate() {
                    let (tx, rx) = oneshot::channel();
                    let cel = Arc::clone(&self.cel);
                    let policy = Arc::clone(policy);
                    let env = Arc::clone(env);
                    let roles = Arc::clone(roles);
                    let metrics = Arc::clone(&self.metrics);
                    let action = action.clone();

                    self.pool
                        .submit(Box::new(move || {
                            let outcome = evaluate_policy_for_action(
                                &cel, &policy, &action, &roles, &env, &*metrics, action_idx,
                                tier, policy_idx,
                            );
                            let _ = tx.send(outcome);
                        }))
                        .await?;
                    receivers.push(rx);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(receivers.len());
        for rx in receivers {
            if let Ok(outcome) = rx.await {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    /// Merge evaluation outcomes under tier priority and deny-overrides
    fn merge_outcomes(&self, actions: &[String], outcomes: &[PolicyOutcome]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());

        for (action_idx, action) in actions.iter().enumerate() {
            let mut verdict: Option<ActionResult> = None;

            for tier in 0..TIER_COUNT {
                let mut tier_deny: Option<(usize, &(String, String))> = None;
                let mut tier_allow: Option<(usize, &(String, String))> = None;

                for outcome in outcomes
                    .iter()
                    .filter(|o| o.action_idx == action_idx && o.tier == tier)
                {
                    if let Some(deny) = &outcome.deny {
                        if tier_deny.map_or(true, |(idx, _)| outcome.policy_idx < idx) {
                            tier_deny = Some((outcome.policy_idx, deny));
                        }
                    }
                    if let Some(allow) = &outcome.allow {
                        if tier_allow.map_or(true, |(idx, _)| outcome.policy_idx < idx) {
                            tier_allow = Some((outcome.policy_idx, allow));
                        }
                    }
                }

                // Deny-overrides within the tier
                if let Some((_, (policy, rule))) = tier_deny {
                    verdict = Some(ActionResult::matched(action, Effect::Deny, policy, rule));
                    break;
                }
                if let Some((_, (policy, rule))) = tier_allow {
                    verdict = Some(ActionResult::matched(action, Effect::Allow, policy, rule));
                    break;
                }
            }

            results
                .push(verdict.unwrap_or_else(|| ActionResult::unmatched(action, self.default_effect)));
        }

        results
    }
}

/// Evaluate one policy's rules for one action
///
/// Deny short-circuits the policy; the first passing allow is remembered.
/// A condition that fails to evaluate skips its rule and the walk
/// continues.
#[allow(clippy::too_many_arguments)]
fn evaluate_policy_for_action(
    cel: &CelEngine,
    policy: &Policy,
    action: &str,
    roles: &[String],
    env: &EvalContext,
    metrics: &dyn Metrics,
    action_idx: usize,
    tier: usize,
    policy_idx: usize,
) -> PolicyOutcome {
    let mut allow = None;

    for rule in &policy.rules {
        if !rule.matches_action(action) {
            continue;
        }
        if !rule.matches_roles(roles) {
            continue;
        }

        if let Some(condition) = &rule.condition {
            match cel.evaluate_expression(condition, env) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(
                        policy = %policy.name,
                        rule = %rule.name,
                        error = %e,
                        "condition evaluation failed; rule skipped"
                    );
                    metrics.record_auth_error("condition_eval");
                    continue;
                }
            }
        }

        match rule.effect {
            Effect::Deny => {
                return PolicyOutcome {
                    action_idx,
                    tier,
                    policy_idx,
                    deny: Some((policy.name.clone(), rule.name.clone())),
                    allow,
                }
            }
            Effect::Allow => {
                if allow.is_none() {
                    allow = Some((policy.name.clone(), rule.name.clone()));
                }
            }
        }
    }

    PolicyOutcome {
        action_idx,
        tier,
        policy_idx,
        deny: None,
        allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MemoryPolicyStore, Rule};
    use crate::types::{Principal, Resource};

    fn engine_with(store: Arc<MemoryPolicyStore>) -> DecisionEngine {
        DecisionEngine::new(EngineConfig::default(), store).unwrap()
    }

    #[tokio::test]
    async fn test_engine_creation() {
        let engine = engine_with(Arc::new(MemoryPolicyStore::new()));
        assert!(engine.cache_stats().is_some());
        assert!(engine.embedding().is_none());
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let engine = DecisionEngine::new(
            EngineConfig {
                cache_enabled: false,
                ..Default::default()
            },
            Arc::new(MemoryPolicyStore::new()),
        )
        .unwrap();
        assert!(engine.cache_stats().is_none());
    }

    #[tokio::test]
    async fn test_embedding_without_vector_store_fails() {
        let result = DecisionEngine::new(
            EngineConfig {
                embedding: Some(EmbeddingConfig::default()),
                ..Default::default()
            },
            Arc::new(MemoryPolicyStore::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let engine = engine_with(Arc::new(MemoryPolicyStore::new()));
        let request = CheckRequest::new(
            Principal::new("u1"),
            Resource::new("document", "d1"),
            vec![],
        );

        let result = engine.check(&request, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AuthzError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_cancelled_request_rejected() {
        let engine = engine_with(Arc::new(MemoryPolicyStore::new()));
        let request = CheckRequest::new(
            Principal::new("u1"),
            Resource::new("document", "d1"),
            vec!["read".to_string()],
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine.check(&request, &cancel).await;
        assert!(matches!(result, Err(AuthzError::Cancelled)));
    }

    #[tokio::test]
    async fn test_duplicate_actions_collapse() {
        let store = Arc::new(MemoryPolicyStore::new());
        store
            .add(
                Policy::resource_policy("doc", "document")
                    .with_rule(Rule::new("read", vec!["read".to_string()], Effect::Allow)),
            )
            .await
            .unwrap();

        let engine = engine_with(store);
        let request = CheckRequest::new(
            Principal::new("u1"),
            Resource::new("document", "d1"),
            vec!["read".to_string(), "read".to_string()],
        );

        let response = engine
            .check(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
    }

    #[tokio::test]
    async fn test_generated_request_id() {
        let engine = engine_with(Arc::new(MemoryPolicyStore::new()));
        let request = CheckRequest::new(
            Principal::new("u1"),
            Resource::new("document", "d1"),
            vec!["read".to_string()],
        );

        let response = engine
            .check(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!response.request_id.is_empty());

        let tagged = request.with_request_id("req-7");
        let response = engine
            .check(&tagged, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.request_id, "req-7");
    }
}
