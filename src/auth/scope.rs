//! Scope model for credentials and consent
//!
//! Scopes are free-form capability strings (e.g. `calendar.write`) carried in
//! credentials as a space-separated list. The wildcard scope grants everything.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scope that satisfies any requirement
pub const WILDCARD: &str = "*";

/// Scopes used by the response pipeline
pub const INCIDENT_ANALYZE: &str = "incident.analyze";
pub const CONTENT_VERIFY: &str = "content.verify";
pub const CALENDAR_WRITE: &str = "calendar.write";
pub const NOTIFY_SEND: &str = "notify.send";

/// An ordered set of scope strings with subset/wildcard checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet {
    scopes: BTreeSet<String>,
}

impl ScopeSet {
    /// Create a new empty scope set
    pub fn new() -> Self {
        Self {
            scopes: BTreeSet::new(),
        }
    }

    /// Parse from the space-separated credential wire form
    pub fn from_scope_string(s: &str) -> Self {
        s.split_whitespace().collect()
    }

    /// Render as the space-separated credential wire form
    pub fn to_scope_string(&self) -> String {
        self.scopes.iter().cloned().collect::<Vec<_>>().join(" ")
    }

    /// Add a scope
    pub fn add(&mut self, scope: impl Into<String>) {
        self.scopes.insert(scope.into());
    }

    /// Check if this set contains a scope (exact match, no wildcard expansion)
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// True iff every required scope is present, or this set holds the wildcard
    pub fn satisfies(&self, required: &ScopeSet) -> bool {
        if self.scopes.contains(WILDCARD) {
            return true;
        }
        required.scopes.is_subset(&self.scopes)
    }

    /// Scopes present in both sets
    pub fn intersect(&self, other: &ScopeSet) -> ScopeSet {
        Self {
            scopes: self.scopes.intersection(&other.scopes).cloned().collect(),
        }
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.scopes.iter()
    }

    /// Convert to a vec for serialization boundaries
    pub fn to_vec(&self) -> Vec<String> {
        self.scopes.iter().cloned().collect()
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_scope_string())
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            scopes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        scopes.into_iter().collect()
    }
}
