//! Scope resolution integration tests: chains, wildcard matching and
//! scope-aware policy selection through the engine

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use authz::engine::{DecisionEngine, EngineConfig};
use authz::policy::{MemoryPolicyStore, Policy, PolicyStore, Rule};
use authz::scope::{ScopeConfig, ScopeError, ScopeResolver};
use authz::types::{CheckRequest, Effect, Principal, Resource};

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

#[test]
fn chain_shape_matches_hierarchy() {
    let resolver = ScopeResolver::new(ScopeConfig::default());

    assert_eq!(
        resolver.build_scope_chain("a.b.c").unwrap().to_vec(),
        vec!["a.b.c", "a.b", "a"]
    );
    assert!(resolver.build_scope_chain("").unwrap().is_empty());
    assert!(matches!(
        resolver.build_scope_chain("a..c"),
        Err(ScopeError::EmptySegment { .. })
    ));
    assert!(matches!(
        resolver.build_scope_chain("a.b c"),
        Err(ScopeError::BadCharacter { .. })
    ));
}

#[test]
fn wildcard_matching_over_chains() {
    let resolver = ScopeResolver::new(ScopeConfig::default());
    let chain = resolver.build_scope_chain("acme.corp.eng").unwrap();

    // Every chain element is under acme.**
    for scope in chain.iter() {
        assert!(resolver.match_scope("acme.**", scope));
    }

    assert!(resolver.match_scope("acme.*.eng", "acme.corp.eng"));
    assert!(!resolver.match_scope("acme.*", "acme.corp.eng"));
}

async fn scoped_store() -> Arc<MemoryPolicyStore> {
    let store = Arc::new(MemoryPolicyStore::new());

    store
        .add(
            Policy::resource_policy("corp-docs", "document")
                .with_scope("acme.corp")
                .with_rule(
                    Rule::new("read", vec!["read".to_string()], Effect::Allow)
                        .with_roles(vec!["employee".to_string()]),
                ),
        )
        .await
        .unwrap();
    store
        .add(
            Policy::resource_policy("global-docs", "document").with_rule(
                Rule::new("read", vec!["read".to_string()], Effect::Allow)
                    .with_roles(vec!["admin".to_string()]),
            ),
        )
        .await
        .unwrap();

    store
}

#[tokio::test]
async fn scope_chain_walks_to_nearest_ancestor() {
    let engine = DecisionEngine::new(EngineConfig::default(), scoped_store().await).unwrap();

    let request = CheckRequest::new(
        Principal::new("u1").with_role("employee"),
        Resource::new("document", "d1").with_scope("acme.corp.eng"),
        vec!["read".to_string()],
    );

    let response = engine.check(&request, &cancel()).await.unwrap();
    assert_eq!(response.result_for("read").unwrap().effect, Effect::Allow);

    let scope = response.metadata.scope_resolution.as_ref().unwrap();
    assert_eq!(scope.requested_scope, "acme.corp.eng");
    assert_eq!(scope.chain, vec!["acme.corp.eng", "acme.corp", "acme"]);
    assert_eq!(scope.matched_scope, "acme.corp");
}

#[tokio::test]
async fn unscoped_request_selects_global_policies() {
    let engine = DecisionEngine::new(EngineConfig::default(), scoped_store().await).unwrap();

    let request = CheckRequest::new(
        Principal::new("u1").with_role("admin"),
        Resource::new("document", "d1"),
        vec!["read".to_string()],
    );

    let response = engine.check(&request, &cancel()).await.unwrap();
    assert_eq!(response.result_for("read").unwrap().effect, Effect::Allow);

    let scope = response.metadata.scope_resolution.as_ref().unwrap();
    assert_eq!(scope.matched_scope, "(global)");
    assert!(scope.chain.is_empty());
}

#[tokio::test]
async fn unmatched_scope_falls_back_to_global() {
    let engine = DecisionEngine::new(EngineConfig::default(), scoped_store().await).unwrap();

    // No policies anywhere under "other.*"
    let request = CheckRequest::new(
        Principal::new("u1").with_role("admin"),
        Resource::new("document", "d1").with_scope("other.org"),
        vec!["read".to_string()],
    );

    let response = engine.check(&request, &cancel()).await.unwrap();
    assert_eq!(response.result_for("read").unwrap().effect, Effect::Allow);

    let scope = response.metadata.scope_resolution.as_ref().unwrap();
    assert_eq!(scope.matched_scope, "(global)");
    assert_eq!(scope.chain, vec!["other.org", "other"]);
}

#[tokio::test]
async fn principal_scope_is_used_when_resource_scope_is_empty() {
    let engine = DecisionEngine::new(EngineConfig::default(), scoped_store().await).unwrap();

    let request = CheckRequest::new(
        Principal::new("u1")
            .with_role("employee")
            .with_scope("acme.corp"),
        Resource::new("document", "d1"),
        vec!["read".to_string()],
    );

    let response = engine.check(&request, &cancel()).await.unwrap();
    assert_eq!(response.result_for("read").unwrap().effect, Effect::Allow);

    let scope = response.metadata.scope_resolution.as_ref().unwrap();
    assert_eq!(scope.requested_scope, "acme.corp");
    assert_eq!(scope.matched_scope, "acme.corp");
}

#[tokio::test]
async fn invalid_scope_degrades_to_global() {
    let engine = DecisionEngine::new(EngineConfig::default(), scoped_store().await).unwrap();

    let request = CheckRequest::new(
        Principal::new("u1").with_role("admin"),
        Resource::new("document", "d1").with_scope("bad scope!"),
        vec!["read".to_string()],
    );

    let response = engine.check(&request, &cancel()).await.unwrap();
    assert_eq!(response.result_for("read").unwrap().effect, Effect::Allow);

    let scope = response.metadata.scope_resolution.as_ref().unwrap();
    assert_eq!(scope.matched_scope, "(invalid)");
}

#[tokio::test]
async fn deeper_scope_shadows_ancestor() {
    let store = scoped_store().await;
    // A deny policy right at the engineering scope
    store
        .add(
            Policy::resource_policy("eng-freeze", "document")
                .with_scope("acme.corp.eng")
                .with_rule(Rule::new("freeze", vec!["read".to_string()], Effect::Deny)),
        )
        .await
        .unwrap();

    let engine = DecisionEngine::new(EngineConfig::default(), store).unwrap();

    let request = CheckRequest::new(
        Principal::new("u1").with_role("employee"),
        Resource::new("document", "d1").with_scope("acme.corp.eng"),
        vec!["read".to_string()],
    );

    let response = engine.check(&request, &cancel()).await.unwrap();
    let result = response.result_for("read").unwrap();
    assert_eq!(result.effect, Effect::Deny);
    assert_eq!(result.policy.as_deref(), Some("eng-freeze"));

    let scope = response.metadata.scope_resolution.as_ref().unwrap();
    assert_eq!(scope.matched_scope, "acme.corp.eng");
}
