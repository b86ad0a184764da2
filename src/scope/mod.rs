//! Hierarchical scope names
//!
//! A scope is a dotted name such as `acme.platform.billing`; the empty
//! name is the global level. Policy selection walks a scope's ancestor
//! chain from most to least specific, and policies may address whole
//! subtrees with wildcard patterns (`*` for one segment, `**` for any
//! suffix).

mod resolver;

pub use resolver::{ScopeCacheStats, ScopeConfig, ScopeResolver};

use std::fmt;
use thiserror::Error;

/// Depth limit applied when no configuration is supplied
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Why a scope name was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("scope '{scope}' has an empty segment at position {position}")]
    EmptySegment { scope: String, position: usize },

    #[error("scope '{scope}': segment '{segment}' has characters outside [A-Za-z0-9_-]")]
    BadCharacter { scope: String, segment: String },

    #[error("scope '{scope}' is {depth} segments deep, limit is {max_depth}")]
    TooDeep {
        scope: String,
        depth: usize,
        max_depth: usize,
    },
}

/// A validated dotted scope name
///
/// Holding a `Scope` is proof the name passed segment and depth
/// validation. The name is kept as a single string; segment access works
/// directly on it, nothing is pre-split.
///
/// # Examples
///
/// ```
/// use authz::scope::Scope;
///
/// let scope = Scope::new("acme.platform.billing").unwrap();
/// assert_eq!(scope.depth(), 3);
///
/// let walked: Vec<&str> = scope.ancestors().collect();
/// assert_eq!(walked, ["acme.platform.billing", "acme.platform", "acme"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    name: String,
}

impl Scope {
    /// Parse and validate a name under [`DEFAULT_MAX_DEPTH`]
    pub fn new(name: impl Into<String>) -> Result<Self, ScopeError> {
        Self::parse(name, DEFAULT_MAX_DEPTH)
    }

    /// Parse and validate a name
    ///
    /// The empty name is the valid global scope. Every segment must be
    /// non-empty and drawn from `[A-Za-z0-9_-]`, and the segment count
    /// must stay within `max_depth`.
    pub fn parse(name: impl Into<String>, max_depth: usize) -> Result<Self, ScopeError> {
        let name = name.into();

        if name.is_empty() {
            return Ok(Self { name });
        }

        let mut depth = 0;
        for (position, segment) in name.split('.').enumerate() {
            depth += 1;

            if segment.is_empty() {
                return Err(ScopeError::EmptySegment {
                    scope: name.clone(),
                    position,
                });
            }

            let well_formed = segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
            if !well_formed {
                return Err(ScopeError::BadCharacter {
                    scope: name.clone(),
                    segment: segment.to_string(),
                });
            }
        }

        if depth > max_depth {
            return Err(ScopeError::TooDeep {
                scope: name.clone(),
                depth,
                max_depth,
            });
        }

        Ok(Self { name })
    }

    /// The scope name as written
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// True for the global (empty) scope
    pub fn is_global(&self) -> bool {
        self.name.is_empty()
    }

    /// Number of segments; the global scope has depth zero
    pub fn depth(&self) -> usize {
        if self.name.is_empty() {
            0
        } else {
            self.name.bytes().filter(|b| *b == b'.').count() + 1
        }
    }

    /// Iterate this scope and its ancestors, most specific first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            rest: (!self.name.is_empty()).then_some(self.name.as_str()),
        }
    }

    /// True when `other` sits at or below this scope
    ///
    /// The global scope contains everything.
    pub fn contains(&self, other: &Scope) -> bool {
        if self.is_global() {
            return true;
        }

        other.name == self.name
            || (other.name.len() > self.name.len()
                && other.name.starts_with(&self.name)
                && other.name.as_bytes()[self.name.len()] == b'.')
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for Scope {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Iterator over a scope's ancestor names
///
/// Each step truncates the name at its last dot, so the items are slices
/// of the original string.
pub struct Ancestors<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.rest?;
        self.rest = current.rfind('.').map(|dot| &current[..dot]);
        Some(current)
    }
}

/// A scope's policy-lookup order, most specific first
///
/// This is what the decision engine walks when it resolves resource
/// policies: the first chain element with any policies wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeChain {
    scopes: Vec<String>,
}

impl ScopeChain {
    /// The chain of the global scope: no elements
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The chain head, absent only for the global scope
    pub fn most_specific(&self) -> Option<&str> {
        self.scopes.first().map(String::as_str)
    }

    /// The chain as owned names, for response metadata
    pub fn to_vec(&self) -> Vec<String> {
        self.scopes.clone()
    }
}

impl From<&Scope> for ScopeChain {
    fn from(scope: &Scope) -> Self {
        Self {
            scopes: scope.ancestors().map(str::to_string).collect(),
        }
    }
}
