//! Relation Change Events
//!
//! Event types broadcast by `FamilyService` whenever a mutation commits.
//! Consumers (cache invalidation, UI refresh) subscribe through
//! `FamilyService::subscribe` and receive one event per committed write.

use serde::{Deserialize, Serialize};

/// Direction of a committed relation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Nodes or edges were created or rewritten.
    Add,
    /// A node was deleted and its edges cascaded away.
    Remove,
}

/// Notification that a set of nodes was touched by a committed mutation.
///
/// `node_ids` lists every node whose stored document changed, so a consumer
/// can invalidate exactly the affected entries. Events are emitted only
/// after the storage transaction commits; a lost event (lagging receiver)
/// never implies a lost write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationChange {
    /// Ids of every node whose document was rewritten.
    pub node_ids: Vec<String>,
    /// Whether the change added or removed graph structure.
    pub action: ChangeAction,
}

impl RelationChange {
    /// Convenience constructor for an additive change.
    pub fn added(node_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            action: ChangeAction::Add,
        }
    }

    /// Convenience constructor for a removal.
    pub fn removed(node_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            action: ChangeAction::Remove,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_action_serialization() {
        assert_eq!(
            serde_json::to_string(&ChangeAction::Add).unwrap(),
            "\"add\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeAction::Remove).unwrap(),
            "\"remove\""
        );
    }

    #[test]
    fn test_relation_change_constructors() {
        let added = RelationChange::added(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(added.action, ChangeAction::Add);
        assert_eq!(added.node_ids.len(), 2);

        let removed = RelationChange::removed(vec!["c".to_string()]);
        assert_eq!(removed.action, ChangeAction::Remove);
    }
}
