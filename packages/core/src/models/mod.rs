//! Data Models
//!
//! Core data structures for the family graph:
//!
//! - `Node` - a person with embedded relation-edge lists
//! - Relation edge types and the derived `families` entries
//! - Per-operation input structs
//!
//! Nodes are persisted as single documents embedding their own edge lists;
//! there is no separate edge table.

mod input;
mod node;
mod relation;

pub use input::{ChildInput, ParentsInput, PersonInput, ProfileImageInput, UpdateNodeInput};
pub use node::{
    sibling_kind_for, BirthDate, BirthPlace, Gender, Nickname, Node, PersonName, ValidationError,
    MAX_SPOUSES_FEMALE, MAX_SPOUSES_MALE,
};
pub use relation::{
    contains_id, NodeFamily, NodeRelation, ParentalRelation, RelativeKind, SiblingRelation,
    SpousalRelation,
};
