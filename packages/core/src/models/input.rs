//! Operation Input Structs
//!
//! Each mutating operation takes an explicit, typed input struct instead of
//! a generic payload bag. Inputs describe brand-new person nodes (relation
//! attachment mints its neighbors in the same transaction) or field-level
//! patches for an existing node.

use crate::models::node::{BirthDate, Gender, Nickname, Node, PersonName};
use serde::{Deserialize, Serialize};

/// Description of a brand-new person node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonInput {
    pub name: PersonName,
    pub gender: Gender,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<BirthDate>,
}

impl PersonInput {
    /// Mint a standalone node from this description.
    pub fn into_node(self) -> Node {
        Node::new(self.name, self.gender, self.birth)
    }
}

/// Input for attaching a parent pair to an anchor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentsInput {
    pub father: PersonInput,
    pub mother: PersonInput,
}

/// Input for attaching a child to a married couple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildInput {
    /// The anchor's spouse; both must already hold mutual spouse edges
    pub spouse_id: String,

    pub child: PersonInput,
}

/// Field-level patch for an existing node.
///
/// Omitted composite fields (`birth`, `death`) are explicitly cleared, not
/// left stale. `name` and `nicknames` replace their current value only when
/// present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNodeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<PersonName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nicknames: Option<Vec<Nickname>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<BirthDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death: Option<BirthDate>,
}

/// Set or clear the profile image reference of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageInput {
    /// Externally-managed file id; `None` clears the reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}
