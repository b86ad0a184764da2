//! Scope chain resolution and wildcard pattern matching
//!
//! Two caches back the resolver. Chains are memoized under a TTL and
//! wiped wholesale at capacity; they are pure functions of the name, so
//! a wipe only costs recomputation. Wildcard patterns are compiled to
//! anchored regexes once and kept indefinitely, since a pattern's
//! compiled form never changes.

use dashmap::DashMap;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Scope, ScopeChain, ScopeError, DEFAULT_MAX_DEPTH};

/// Configuration for the scope resolver
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    /// Maximum depth of the scope hierarchy
    pub max_depth: usize,

    /// Allow wildcard patterns in scope matching
    pub allow_wildcards: bool,

    /// Time-to-live for memoized chains, absolute from insertion
    pub cache_ttl: Duration,

    /// Chain-cache capacity; overflow wipes the cache
    pub max_cached_chains: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            allow_wildcards: true,
            cache_ttl: Duration::from_secs(60),
            max_cached_chains: 10_000,
        }
    }
}

/// Resolver cache statistics
#[derive(Debug, Clone, Default)]
pub struct ScopeCacheStats {
    /// Memoized chains currently held
    pub chains: usize,

    /// Compiled wildcard patterns currently held
    pub patterns: usize,

    pub hits: u64,
    pub misses: u64,
}

impl ScopeCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CachedChain {
    chain: ScopeChain,
    created: Instant,
}

/// Builds scope chains and matches wildcard scope patterns
///
/// # Examples
///
/// ```
/// use authz::scope::{ScopeConfig, ScopeResolver};
///
/// let resolver = ScopeResolver::new(ScopeConfig::default());
///
/// let chain = resolver.build_scope_chain("acme.platform.billing").unwrap();
/// assert_eq!(chain.to_vec(), vec!["acme.platform.billing", "acme.platform", "acme"]);
///
/// assert!(resolver.match_scope("acme.*", "acme.platform"));
/// assert!(resolver.match_scope("acme.**", "acme"));
/// ```
pub struct ScopeResolver {
    config: ScopeConfig,
    chains: DashMap<String, CachedChain>,
    patterns: DashMap<String, Arc<Regex>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScopeResolver {
    pub fn new(config: ScopeConfig) -> Self {
        Self {
            config,
            chains: DashMap::new(),
            patterns: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The lookup chain for a scope name, most specific first
    ///
    /// The global (empty) name yields the empty chain without touching
    /// the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError`] when the name fails validation.
    pub fn build_scope_chain(&self, scope: &str) -> Result<ScopeChain, ScopeError> {
        if scope.is_empty() {
            return Ok(ScopeChain::empty());
        }

        if let Some(entry) = self.chains.get(scope) {
            if entry.created.elapsed() <= self.config.cache_ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.chain.clone());
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let parsed = Scope::parse(scope, self.config.max_depth)?;
        let chain = ScopeChain::from(&parsed);

        if self.chains.len() >= self.config.max_cached_chains {
            self.chains.clear();
        }
        self.chains.insert(
            scope.to_string(),
            CachedChain {
                chain: chain.clone(),
                created: Instant::now(),
            },
        );

        Ok(chain)
    }

    /// Validate a scope name without building its chain
    pub fn validate_scope(&self, scope: &str) -> Result<(), ScopeError> {
        Scope::parse(scope, self.config.max_depth).map(|_| ())
    }

    /// Match a wildcard pattern against a scope name
    ///
    /// `*` matches exactly one segment; `**` matches any suffix including
    /// the empty one, so `a.**` matches `a` itself. Without wildcards
    /// only exact equality matches.
    pub fn match_scope(&self, pattern: &str, scope: &str) -> bool {
        if pattern == scope {
            return true;
        }

        if !self.config.allow_wildcards || !pattern.contains('*') {
            return false;
        }

        match self.compiled(pattern) {
            Some(regex) => regex.is_match(scope),
            None => false,
        }
    }

    /// Match a scope name against any of the given patterns
    pub fn matches_any(&self, patterns: &[&str], scope: &str) -> bool {
        patterns.iter().any(|p| self.match_scope(p, scope))
    }

    /// Drop both caches and reset the counters
    pub fn clear_cache(&self) {
        self.chains.clear();
        self.patterns.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ScopeCacheStats {
        ScopeCacheStats {
            chains: self.chains.len(),
            patterns: self.patterns.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// The compiled form of a wildcard pattern, compiled at most once
    fn compiled(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Some(regex) = self.patterns.get(pattern) {
            return Some(regex.clone());
        }

        let regex = Arc::new(Regex::new(&pattern_to_regex(pattern)).ok()?);
        self.patterns.insert(pattern.to_string(), regex.clone());
        Some(regex)
    }
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::new(ScopeConfig::default())
    }
}

/// Translate a wildcard pattern into an anchored regex, segment by
/// segment
///
/// A `**` segment absorbs its own leading separator, which is what lets
/// `a.**` match the bare `a`.
fn pattern_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    for (i, segment) in pattern.split('.').enumerate() {
        match segment {
            "**" if i == 0 => out.push_str(".*"),
            "**" => out.push_str(r"(\..*)?"),
            "*" => {
                if i > 0 {
                    out.push_str(r"\.");
                }
                out.push_str("[^.]+");
            }
            literal => {
                if i > 0 {
                    out.push_str(r"\.");
                }
                out.push_str(&regex::escape(literal));
            }
        }
    }

    out.push('$');
    out
}
