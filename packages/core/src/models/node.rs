//! Person Node Data Structures
//!
//! This module defines the core `Node` struct for the family graph: one
//! person, with an embedded list of typed relation edges per relative kind
//! and a derived `families` list identifying the root ancestry line(s) the
//! person currently belongs to.
//!
//! # Architecture
//!
//! - **Arena of nodes keyed by stable id**: relation lists hold ids, never
//!   owning pointers, so the cyclic family graph has no ownership cycles.
//! - **Embedded edges**: each node document carries its own `parents`,
//!   `children`, `spouses` and `siblings` lists. Reciprocity across
//!   documents is enforced by the relation engine, not by this struct.
//! - **Derived families**: `families` is a materialized view over the parent
//!   chain; empty exactly when the node is a root of the forest.

use crate::models::relation::{
    NodeFamily, NodeRelation, ParentalRelation, RelativeKind, SiblingRelation, SpousalRelation,
};
use crate::utils::strings::start_case;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Spouse ceiling for male nodes
pub const MAX_SPOUSES_MALE: usize = 4;

/// Spouse ceiling for female nodes
pub const MAX_SPOUSES_FEMALE: usize = 1;

/// Validation errors for person nodes
#[derive(Error, Debug)]
pub enum ValidationError {
    /// First name is required and must be non-empty
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Birth or death date is not a real calendar date
    #[error("Invalid {field} date [{year}-{month}-{day}]")]
    InvalidDate {
        field: &'static str,
        year: i32,
        month: u32,
        day: u32,
    },
}

/// Gender of a person node.
///
/// Immutable once the node has any spouse edge; changing it afterwards would
/// invalidate the gender-based spouse ceiling and the parent-pair invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Lowercase storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// A nickname with a selection flag.
///
/// The first selected nickname doubles as the public display name when a
/// viewer is anonymous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nickname {
    pub name: String,

    #[serde(default)]
    pub selected: bool,
}

/// Structured person name. Parts are stored lowercase; presentation casing
/// is computed by [`Node::fullname`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nicknames: Vec<Nickname>,
}

/// Birth or death place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthPlace {
    #[serde(default)]
    pub city: String,

    #[serde(default)]
    pub country: String,
}

/// A calendar date attached to a node (birth or death), validated against
/// real day counts including leap-year February.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<BirthPlace>,
}

impl BirthDate {
    /// Validate against real calendar day counts.
    ///
    /// `field` names the composite ("birth" or "death") for the error message.
    pub fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        let invalid = ValidationError::InvalidDate {
            field,
            year: self.year,
            month: self.month,
            day: self.day,
        };

        if self.month < 1 || self.month > 12 {
            return Err(invalid);
        }
        if self.day < 1 || self.day > days_in_month(self.year, self.month) {
            return Err(invalid);
        }
        Ok(())
    }
}

/// Day count of a month, leap-year aware.
fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// A person in the family graph.
///
/// Relation lists are unordered sets of [`NodeRelation`] edges; `families`
/// is the derived list of root ancestor lines. All cross-document
/// consistency (reciprocal edges, sibling inference, family re-anchoring)
/// is maintained by `FamilyService` and committed atomically through the
/// store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier, stable for the node's lifetime
    pub id: String,

    pub name: PersonName,

    pub gender: Gender,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<BirthDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death: Option<BirthDate>,

    /// Foreign reference to an externally-managed file resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,

    #[serde(default)]
    pub parents: Vec<NodeRelation<ParentalRelation>>,

    #[serde(default)]
    pub children: Vec<NodeRelation<ParentalRelation>>,

    #[serde(default)]
    pub spouses: Vec<NodeRelation<SpousalRelation>>,

    #[serde(default)]
    pub siblings: Vec<NodeRelation<SiblingRelation>>,

    /// Root ancestry lines this node belongs to; empty iff the node is a root
    #[serde(default)]
    pub families: Vec<NodeFamily>,

    /// External account that has claimed this node (presence only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
}

impl Node {
    /// Create a standalone node (no relations) with a generated id.
    pub fn new(name: PersonName, gender: Gender, birth: Option<BirthDate>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            gender,
            birth,
            death: None,
            profile_image: None,
            parents: Vec::new(),
            children: Vec::new(),
            spouses: Vec::new(),
            siblings: Vec::new(),
            families: Vec::new(),
            owner_user_id: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Validate required fields and calendar correctness of birth/death.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.first.trim().is_empty() {
            return Err(ValidationError::MissingField("name.first".to_string()));
        }
        if let Some(birth) = &self.birth {
            birth.validate("birth")?;
        }
        if let Some(death) = &self.death {
            death.validate("death")?;
        }
        Ok(())
    }

    /// Start-cased "first middle last" display name.
    pub fn fullname(&self) -> String {
        let mut parts = vec![self.name.first.as_str()];
        if let Some(middle) = &self.name.middle {
            parts.push(middle.as_str());
        }
        if let Some(last) = &self.name.last {
            parts.push(last.as_str());
        }
        start_case(&parts.join(" "))
    }

    /// Collapsed display name for anonymous viewers: the first selected
    /// nickname, or the first name when none is selected.
    pub fn public_name(&self) -> String {
        self.name
            .nicknames
            .iter()
            .find(|n| n.selected)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| self.name.first.clone())
    }

    /// Gender-based spouse ceiling.
    pub fn max_spouses(&self) -> usize {
        match self.gender {
            Gender::Male => MAX_SPOUSES_MALE,
            Gender::Female => MAX_SPOUSES_FEMALE,
        }
    }

    /// Number of spouse edges with the given subtype.
    pub fn total_spouses(&self, kind: SpousalRelation) -> usize {
        self.spouses.iter().filter(|e| e.kind == kind).count()
    }

    /// A node is a root of the forest iff it belongs to no family line.
    pub fn is_root(&self) -> bool {
        self.families.is_empty()
    }

    /// Target ids of one relative list.
    pub fn relative_ids(&self, kind: RelativeKind) -> Vec<String> {
        match kind {
            RelativeKind::Parents => self.parents.iter().map(|e| e.id.clone()).collect(),
            RelativeKind::Children => self.children.iter().map(|e| e.id.clone()).collect(),
            RelativeKind::Spouses => self.spouses.iter().map(|e| e.id.clone()).collect(),
            RelativeKind::Siblings => self.siblings.iter().map(|e| e.id.clone()).collect(),
        }
    }

    /// Target ids across all four relation lists (delete notification set).
    pub fn neighbor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for kind in [
            RelativeKind::Parents,
            RelativeKind::Siblings,
            RelativeKind::Spouses,
            RelativeKind::Children,
        ] {
            for id in self.relative_ids(kind) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Whether this node holds a spouse edge towards `id`.
    pub fn has_spouse(&self, id: &str) -> bool {
        self.spouses.iter().any(|e| e.id == id)
    }
}

/// Sibling subtype inferred when copying a parent's child edge onto a new
/// sibling pair: blood children are blood siblings, adoptive children are
/// half siblings.
pub fn sibling_kind_for(parental: ParentalRelation) -> SiblingRelation {
    match parental {
        ParentalRelation::Blood => SiblingRelation::Blood,
        ParentalRelation::Adoptive => SiblingRelation::Half,
    }
}
