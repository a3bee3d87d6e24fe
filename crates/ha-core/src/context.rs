//! Context type linking an action to whoever caused it

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies the origin of a state write, event or service call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier (ULID)
    pub id: String,

    /// User that initiated the action, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Context this one was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: None,
            parent_id: None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_contexts_are_unique() {
        let a = Context::new();
        let b = Context::new();

        assert_ne!(a.id, b.id);
        assert!(a.user_id.is_none());
        assert!(a.parent_id.is_none());
    }
}
