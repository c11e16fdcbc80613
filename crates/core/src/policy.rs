//! Access-policy documents shared between the harness and the mock server.
//!
//! Documents are deliberately small: a list of statements over action
//! patterns with trailing-`*` wildcard matching. Resources are carried for
//! shape but not evaluated; the mock backend scopes everything to one
//! physical store anyway.

use serde::{Deserialize, Serialize};

/// Statement effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single policy statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub effect: Effect,
    pub action: Vec<String>,
    pub resource: String,
}

impl Statement {
    /// An allow statement over the given action patterns, scoped to all
    /// resources.
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            effect: Effect::Allow,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: "*".to_string(),
        }
    }

    fn matches(&self, action: &str) -> bool {
        self.action.iter().any(|p| action_matches(p, action))
    }
}

/// A policy document: an ordered list of statements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

/// Document schema version.
pub const POLICY_VERSION: &str = "1";

impl PolicyDocument {
    /// Build a document from statements.
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Whether the document allows `action`: at least one allow statement
    /// matches and no deny statement does.
    pub fn allows(&self, action: &str) -> bool {
        let denied = self
            .statement
            .iter()
            .any(|s| s.effect == Effect::Deny && s.matches(action));
        if denied {
            return false;
        }
        self.statement
            .iter()
            .any(|s| s.effect == Effect::Allow && s.matches(action))
    }
}

/// Match an action against a pattern, where a trailing `*` matches any
/// suffix. Patterns without a wildcard must match exactly.
fn action_matches(pattern: &str, action: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => action.starts_with(prefix),
        None => pattern == action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_suffix() {
        assert!(action_matches("storage:*", "storage:GetObject"));
        assert!(action_matches("storage:Get*", "storage:GetObject"));
        assert!(action_matches("*", "iam:CreateUser"));
        assert!(!action_matches("storage:Get*", "storage:PutObject"));
        assert!(!action_matches("storage:GetObject", "storage:GetObjectTagging"));
    }

    #[test]
    fn allow_requires_matching_statement() {
        let doc = PolicyDocument::new(vec![Statement::allow(&[
            "storage:List*",
            "storage:Get*",
        ])]);
        assert!(doc.allows("storage:ListObjects"));
        assert!(doc.allows("storage:GetObject"));
        assert!(!doc.allows("storage:PutObject"));
        assert!(!doc.allows("iam:CreateUser"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let doc = PolicyDocument::new(vec![
            Statement::allow(&["storage:*"]),
            Statement {
                effect: Effect::Deny,
                action: vec!["storage:DeleteBucket".to_string()],
                resource: "*".to_string(),
            },
        ]);
        assert!(doc.allows("storage:PutObject"));
        assert!(!doc.allows("storage:DeleteBucket"));
    }

    #[test]
    fn document_round_trips_through_json() {
        let doc = PolicyDocument::new(vec![Statement::allow(&["storage:*", "iam:*"])]);
        let json = serde_json::to_string(&doc).unwrap();
        let back: PolicyDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
