//! Repair issues raised by integrations
//!
//! Issues are keyed by `(domain, issue_id)`. Creating an issue that already
//! exists keeps the original, so integrations can raise the same problem on
//! every occurrence without flooding the registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub domain: String,
    pub issue_id: String,
    pub severity: IssueSeverity,

    /// Key into the integration's translations
    pub translation_key: String,

    #[serde(default)]
    pub translation_placeholders: HashMap<String, String>,

    pub is_fixable: bool,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(
        domain: impl Into<String>,
        issue_id: impl Into<String>,
        severity: IssueSeverity,
        translation_key: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            issue_id: issue_id.into(),
            severity,
            translation_key: translation_key.into(),
            translation_placeholders: HashMap::new(),
            is_fixable: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.translation_placeholders.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct IssueRegistry {
    issues: DashMap<(String, String), Issue>,
}

impl IssueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an issue; returns false when it was already present
    pub fn create(&self, issue: Issue) -> bool {
        let key = (issue.domain.clone(), issue.issue_id.clone());
        if self.issues.contains_key(&key) {
            debug!(domain = %key.0, issue_id = %key.1, "Issue already registered");
            return false;
        }

        info!(
            domain = %issue.domain,
            issue_id = %issue.issue_id,
            translation_key = %issue.translation_key,
            "Creating issue"
        );
        self.issues.insert(key, issue);
        true
    }

    pub fn get(&self, domain: &str, issue_id: &str) -> Option<Issue> {
        self.issues
            .get(&(domain.to_string(), issue_id.to_string()))
            .map(|i| i.clone())
    }

    pub fn delete(&self, domain: &str, issue_id: &str) -> bool {
        self.issues
            .remove(&(domain.to_string(), issue_id.to_string()))
            .is_some()
    }

    pub fn by_domain(&self, domain: &str) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|i| i.domain == domain)
            .map(|i| i.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_deduplicated() {
        let registry = IssueRegistry::new();

        let issue = Issue::new("state_updated", "missing_entity_x", IssueSeverity::Error, "missing_entity")
            .with_placeholder("entity", "sensor.gone");
        assert!(registry.create(issue.clone()));
        assert!(!registry.create(issue));
        assert_eq!(registry.len(), 1);

        let stored = registry.get("state_updated", "missing_entity_x").unwrap();
        assert_eq!(stored.translation_placeholders["entity"], "sensor.gone");
    }

    #[test]
    fn test_delete_and_by_domain() {
        let registry = IssueRegistry::new();
        registry.create(Issue::new("a", "one", IssueSeverity::Warning, "k"));
        registry.create(Issue::new("b", "one", IssueSeverity::Warning, "k"));

        assert_eq!(registry.by_domain("a").len(), 1);
        assert!(registry.delete("a", "one"));
        assert!(!registry.delete("a", "one"));
        assert!(registry.by_domain("a").is_empty());
    }
}
