//! Relation Edge Types
//!
//! A person node references its relatives through typed, symmetric relation
//! edges. Each edge carries the target node id plus a subtype from a small
//! closed vocabulary (blood/adoptive, married/divorced, blood/half). Edges are
//! stored on both endpoints; the engine in `services::family_service` is
//! responsible for keeping the two directions in sync.

use serde::{Deserialize, Serialize};

/// Subtype of a parent/child edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentalRelation {
    Blood,
    Adoptive,
}

/// Subtype of a spouse edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpousalRelation {
    Married,
    Divorced,
}

/// Subtype of a sibling edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingRelation {
    Blood,
    Half,
}

/// A directed reference from one node to another, carrying a relation subtype.
///
/// The generic parameter pins the subtype vocabulary to the list the edge
/// lives in (a spouse list can only hold `SpousalRelation` edges, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRelation<T> {
    /// Target node id
    pub id: String,

    /// Relation subtype
    #[serde(rename = "type")]
    pub kind: T,
}

impl<T> NodeRelation<T> {
    pub fn new(id: impl Into<String>, kind: T) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// A cached pointer to a root ancestor line this node belongs to.
///
/// `name` is a denormalized copy of the ancestor's display name, rewritten
/// whenever that ancestor's name changes. A node with an empty `families`
/// list is itself a root of the forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFamily {
    /// Root ancestor node id
    pub id: String,

    /// Cached display name of the root ancestor
    pub name: String,
}

impl NodeFamily {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The four relative lists a node exposes to read queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeKind {
    Parents,
    Children,
    Spouses,
    Siblings,
}

/// Check whether a relation list already references `id`.
pub fn contains_id<T>(edges: &[NodeRelation<T>], id: &str) -> bool {
    edges.iter().any(|e| e.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_serializes_subtype_as_type_field() {
        let edge = NodeRelation::new("abc", SpousalRelation::Married);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["type"], "married");
    }

    #[test]
    fn test_parental_relation_roundtrip() {
        let edge = NodeRelation::new("p1", ParentalRelation::Adoptive);
        let json = serde_json::to_string(&edge).unwrap();
        let back: NodeRelation<ParentalRelation> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
    }

    #[test]
    fn test_contains_id() {
        let edges = vec![
            NodeRelation::new("a", SiblingRelation::Blood),
            NodeRelation::new("b", SiblingRelation::Half),
        ];
        assert!(contains_id(&edges, "a"));
        assert!(!contains_id(&edges, "c"));
    }
}
