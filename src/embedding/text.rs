//! Policy serialization for embedding and the placeholder embedder

use sha2::{Digest, Sha256};

use super::EmbedFn;
use crate::policy::Policy;

/// Maximum length of a serialized rule condition
const MAX_CONDITION_LEN: usize = 100;

/// SHA-256 of a text, hex encoded
///
/// This is the bit-stable policy-content hash stored in vector metadata
/// and in the embedding cache.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic, human-readable serialization of a policy
///
/// Joins a header with one line per rule:
///
/// ```text
/// Policy: doc-policy
/// Resource: document
/// Scope: acme.corp
/// ALLOW read, write for editor, admin when owner
/// DENY * for any role
/// ```
pub fn policy_to_text(policy: &Policy) -> String {
    let mut lines = Vec::with_capacity(policy.rules.len() + 3);

    lines.push(format!("Policy: {}", policy.name));
    lines.push(format!("Resource: {}", policy.resource_kind));
    if !policy.scope.is_empty() {
        lines.push(format!("Scope: {}", policy.scope));
    }

    for rule in &policy.rules {
        let roles = if rule.roles.is_empty() {
            "any role".to_string()
        } else {
            rule.roles.join(", ")
        };

        let mut line = format!(
            "{} {} for {}",
            rule.effect.as_str(),
            rule.actions.join(", "),
            roles
        );

        if let Some(condition) = &rule.condition {
            if !condition.is_empty() {
                line.push_str(" when ");
                line.push_str(&simplify_condition(condition));
            }
        }

        lines.push(line);
    }

    lines.join("\n")
}

/// Map common condition fragments to natural-language tokens
///
/// The output feeds the embedder, not the evaluator, so lossy rewriting
/// is fine as long as it is deterministic.
fn simplify_condition(condition: &str) -> String {
    let mut simplified = condition.to_string();

    for (fragment, replacement) in [
        ("resource.attributes.ownerId == principal.id", "owner"),
        ("principal.id == resource.attributes.ownerId", "owner"),
        ("isOwner(principal, resource)", "owner"),
        ("isOwner(P, R)", "owner"),
        ("hasRole(principal, ", "has role "),
        ("hasRole(P, ", "has role "),
        ("inList(", "in list ("),
        ("principal.attributes.", "principal "),
        ("resource.attributes.", "resource "),
        ("&&", " and "),
        ("||", " or "),
        ("==", " is "),
    ] {
        simplified = simplified.replace(fragment, replacement);
    }

    let simplified = simplified.split_whitespace().collect::<Vec<_>>().join(" ");

    if simplified.len() > MAX_CONDITION_LEN {
        simplified.chars().take(MAX_CONDITION_LEN).collect()
    } else {
        simplified
    }
}

/// Deterministic placeholder embedder
///
/// Expands SHA-256 digests of the text into `dimension` floats and
/// L2-normalizes the result. Stands in wherever a real model is not wired
/// up; identical text always embeds identically.
pub fn placeholder_embed_fn(dimension: usize) -> EmbedFn {
    use std::sync::Arc;

    Arc::new(move |text: &str| {
        let mut values = Vec::with_capacity(dimension);
        let mut counter: u32 = 0;

        while values.len() < dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();

            for chunk in digest.chunks_exact(4) {
                if values.len() >= dimension {
                    break;
                }
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Center around zero in [-1, 1)
                values.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }

        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }

        Ok(values)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Rule;
    use crate::types::Effect;

    fn sample_policy() -> Policy {
        Policy::resource_policy("doc-policy", "document")
            .with_scope("acme.corp")
            .with_rule(
                Rule::new(
                    "owner-write",
                    vec!["read".to_string(), "write".to_string()],
                    Effect::Allow,
                )
                .with_roles(vec!["editor".to_string()])
                .with_condition("resource.attributes.ownerId == principal.id"),
            )
            .with_rule(Rule::new("deny-rest", vec!["*".to_string()], Effect::Deny))
    }

    #[test]
    fn test_hash_text_is_sha256_hex() {
        let hash = hash_text("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_policy_to_text_shape() {
        let text = policy_to_text(&sample_policy());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Policy: doc-policy");
        assert_eq!(lines[1], "Resource: document");
        assert_eq!(lines[2], "Scope: acme.corp");
        assert!(lines[3].starts_with("ALLOW read, write for editor when"));
        assert!(lines[3].contains("owner"));
        assert_eq!(lines[4], "DENY * for any role");
    }

    #[test]
    fn test_policy_to_text_deterministic() {
        let a = policy_to_text(&sample_policy());
        let b = policy_to_text(&sample_policy());
        assert_eq!(a, b);
        assert_eq!(hash_text(&a), hash_text(&b));
    }

    #[test]
    fn test_global_policy_omits_scope_line() {
        let policy = Policy::resource_policy("p", "document")
            .with_rule(Rule::new("r", vec!["read".to_string()], Effect::Allow));
        let text = policy_to_text(&policy);
        assert!(!text.contains("Scope:"));
    }

    #[test]
    fn test_condition_truncation() {
        let long_condition = "principal.attributes.x == 'y' && ".repeat(10);
        let policy = Policy::resource_policy("p", "document").with_rule(
            Rule::new("r", vec!["read".to_string()], Effect::Allow)
                .with_condition(long_condition),
        );

        let text = policy_to_text(&policy);
        let rule_line = text.lines().last().unwrap();
        let condition_part = rule_line.split(" when ").nth(1).unwrap();
        assert!(condition_part.len() <= 100);
    }

    #[test]
    fn test_placeholder_embedder_deterministic_and_normalized() {
        let embed = placeholder_embed_fn(384);

        let a = embed("some policy text").unwrap();
        let b = embed("some policy text").unwrap();
        let c = embed("different text").unwrap();

        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_placeholder_embedder_odd_dimension() {
        let embed = placeholder_embed_fn(7);
        assert_eq!(embed("x").unwrap().len(), 7);
    }
}
