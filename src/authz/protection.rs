//! Protection rules
//!
//! Pattern-matched policies requiring a minimum access level for specific
//! mutating actions on matching names (branch protection, package
//! protection). Patterns use `*` wildcards, compiled to anchored regexes at
//! construction; rules never affect names they do not match.

use crate::error::ConfigError;
use crate::membership::AccessLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutating action classes a rule can gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectedAction {
    Push,
    Delete,
    Merge,
    Unprotect,
}

impl ProtectedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectedAction::Push => "push",
            ProtectedAction::Delete => "delete",
            ProtectedAction::Merge => "merge",
            ProtectedAction::Unprotect => "unprotect",
        }
    }
}

impl fmt::Display for ProtectedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A protection rule with per-action minimum levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRule {
    /// Wildcard pattern, e.g. `release/*` or `main`
    pub pattern: String,
    #[serde(default = "default_threshold")]
    pub push_level: AccessLevel,
    #[serde(default = "default_threshold")]
    pub delete_level: AccessLevel,
    #[serde(default = "default_threshold")]
    pub merge_level: AccessLevel,
    #[serde(default = "default_threshold")]
    pub unprotect_level: AccessLevel,
}

fn default_threshold() -> AccessLevel {
    AccessLevel::Maintainer
}

impl ProtectionRule {
    /// A rule requiring maintainer for everything on `pattern`.
    pub fn maintainer_only(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            push_level: AccessLevel::Maintainer,
            delete_level: AccessLevel::Maintainer,
            merge_level: AccessLevel::Maintainer,
            unprotect_level: AccessLevel::Maintainer,
        }
    }

    pub fn required_level(&self, action: ProtectedAction) -> AccessLevel {
        match action {
            ProtectedAction::Push => self.push_level,
            ProtectedAction::Delete => self.delete_level,
            ProtectedAction::Merge => self.merge_level,
            ProtectedAction::Unprotect => self.unprotect_level,
        }
    }
}

/// Compiled wildcard matcher for one rule pattern.
#[derive(Debug)]
pub struct RuleMatcher {
    regex: Regex,
}

impl RuleMatcher {
    /// Compile a wildcard pattern. `*` matches any run of characters; all
    /// other characters match literally; the whole name must match.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for (i, part) in pattern.split('*').enumerate() {
            if i > 0 {
                expr.push_str(".*");
            }
            expr.push_str(&regex::escape(part));
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let matcher = RuleMatcher::new("main").unwrap();
        assert!(matcher.matches("main"));
        assert!(!matcher.matches("main-old"));
        assert!(!matcher.matches("not-main"));
    }

    #[test]
    fn test_prefix_wildcard() {
        let matcher = RuleMatcher::new("release/*").unwrap();
        assert!(matcher.matches("release/1.0"));
        assert!(matcher.matches("release/2024/q1"));
        assert!(!matcher.matches("release"));
        assert!(!matcher.matches("feature/release/x"));
    }

    #[test]
    fn test_leading_wildcard() {
        let matcher = RuleMatcher::new("*-stable").unwrap();
        assert!(matcher.matches("17-stable"));
        assert!(!matcher.matches("stable"));
    }

    #[test]
    fn test_infix_wildcard() {
        let matcher = RuleMatcher::new("v*-stable").unwrap();
        assert!(matcher.matches("v1-stable"));
        assert!(matcher.matches("v17.2-stable"));
        assert!(!matcher.matches("v1-stable-old"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let matcher = RuleMatcher::new("fix.v1").unwrap();
        assert!(matcher.matches("fix.v1"));
        assert!(!matcher.matches("fixxv1"));
    }

    #[test]
    fn test_bare_wildcard_matches_everything() {
        let matcher = RuleMatcher::new("*").unwrap();
        assert!(matcher.matches("anything"));
        assert!(matcher.matches(""));
    }

    #[test]
    fn test_per_action_thresholds() {
        let rule = ProtectionRule {
            pattern: "main".into(),
            push_level: AccessLevel::Developer,
            delete_level: AccessLevel::Maintainer,
            merge_level: AccessLevel::Developer,
            unprotect_level: AccessLevel::Owner,
        };
        assert_eq!(
            rule.required_level(ProtectedAction::Push),
            AccessLevel::Developer
        );
        assert_eq!(
            rule.required_level(ProtectedAction::Delete),
            AccessLevel::Maintainer
        );
        assert_eq!(
            rule.required_level(ProtectedAction::Unprotect),
            AccessLevel::Owner
        );
    }

    #[test]
    fn test_maintainer_only_constructor() {
        let rule = ProtectionRule::maintainer_only("release/*");
        for action in [
            ProtectedAction::Push,
            ProtectedAction::Delete,
            ProtectedAction::Merge,
            ProtectedAction::Unprotect,
        ] {
            assert_eq!(rule.required_level(action), AccessLevel::Maintainer);
        }
    }
}
