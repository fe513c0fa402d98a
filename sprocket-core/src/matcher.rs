//! Group matchers for bulk job and trigger selection.

use serde::{Deserialize, Serialize};

/// Selects groups by comparison against a group name. Matchers are
/// descriptions only; translation into store predicates happens in the
/// store's query helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMatcher {
    /// Every group.
    Anything,
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
}

impl GroupMatcher {
    pub fn any_group() -> Self {
        GroupMatcher::Anything
    }

    pub fn group_equals(group: impl Into<String>) -> Self {
        GroupMatcher::Equals(group.into())
    }

    pub fn group_starts_with(prefix: impl Into<String>) -> Self {
        GroupMatcher::StartsWith(prefix.into())
    }

    pub fn group_ends_with(suffix: impl Into<String>) -> Self {
        GroupMatcher::EndsWith(suffix.into())
    }

    pub fn group_contains(fragment: impl Into<String>) -> Self {
        GroupMatcher::Contains(fragment.into())
    }

    pub fn matches(&self, group: &str) -> bool {
        match self {
            GroupMatcher::Anything => true,
            GroupMatcher::Equals(g) => group == g,
            GroupMatcher::StartsWith(p) => group.starts_with(p.as_str()),
            GroupMatcher::EndsWith(s) => group.ends_with(s.as_str()),
            GroupMatcher::Contains(f) => group.contains(f.as_str()),
        }
    }
}
