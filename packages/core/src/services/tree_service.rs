//! Tree Service - Tree Query Engine
//!
//! Read-side assembly of bounded subgraphs: the anchor's immediate
//! "household" (one hop of any relation type plus everyone referencing the
//! anchor), single relative lists, family listings, and the forest-root
//! directory.
//!
//! Redaction for anonymous viewers is a single pure function over the
//! projected card, never a conditional scattered through query construction,
//! so the policy stays centrally testable.

use crate::db::NodeStore;
use crate::models::{
    Node, NodeFamily, NodeRelation, ParentalRelation, RelativeKind, SiblingRelation,
    SpousalRelation,
};
use crate::services::error::FamilyServiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

type Result<T> = std::result::Result<T, FamilyServiceError>;

/// Identity class of the caller, for redaction purposes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// Anonymous caller; gets the redacted projection
    Public,
    /// Signed-in caller; gets the full projection
    Authenticated,
}

impl Viewer {
    pub fn is_public(&self) -> bool {
        matches!(self, Viewer::Public)
    }
}

/// Per-relation-kind "there is more to expand" flags.
///
/// Set when redaction filtered away edges pointing outside the fetched
/// result set, signalling hidden relatives without leaking their ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandFlags {
    pub parents: bool,
    pub children: bool,
    pub spouses: bool,
    pub siblings: bool,
}

/// Projected person card returned by every read query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,

    /// Display name; collapses to nickname-or-first-name for public viewers
    pub fullname: String,

    pub gender: crate::models::Gender,

    /// Structured name; omitted entirely for public viewers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<crate::models::PersonName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<crate::models::BirthDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death: Option<crate::models::BirthDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,

    pub parents: Vec<NodeRelation<ParentalRelation>>,
    pub children: Vec<NodeRelation<ParentalRelation>>,
    pub spouses: Vec<NodeRelation<SpousalRelation>>,
    pub siblings: Vec<NodeRelation<SiblingRelation>>,
    pub families: Vec<NodeFamily>,

    pub expandable: ExpandFlags,
}

/// Household view around an anchor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootView {
    /// Anchor node id
    pub id: String,
    pub data: Vec<TreeNode>,
    pub total: usize,
    /// True iff the anchor's `families` list is empty
    pub is_root: bool,
}

/// Anchor plus one relative list, projected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativesView {
    pub node: TreeNode,
    pub nodes: Vec<TreeNode>,
}

/// The anchor's stored `families` list, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamiliesView {
    pub id: String,
    pub data: Vec<NodeFamily>,
    pub total: usize,
}

/// One entry in the forest-root directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyHead {
    pub id: String,
    pub name: String,
}

/// Full (unredacted) projection of a node.
fn card_from(node: &Node) -> TreeNode {
    TreeNode {
        id: node.id.clone(),
        fullname: node.fullname(),
        gender: node.gender,
        name: Some(node.name.clone()),
        birth: node.birth.clone(),
        death: node.death.clone(),
        profile_image: node.profile_image.clone(),
        parents: node.parents.clone(),
        children: node.children.clone(),
        spouses: node.spouses.clone(),
        siblings: node.siblings.clone(),
        families: node.families.clone(),
        expandable: ExpandFlags::default(),
    }
}

/// Public-viewer redaction of a projected card.
///
/// Collapses the display name to the first selected nickname (or first
/// name), drops the structured name, birth, death and profile image, and
/// filters relation edges to neighbors inside `present`, raising the
/// expandable flag for every kind that lost edges. Idempotent: applying it
/// twice yields the card from one application.
pub fn redact(mut card: TreeNode, present: &HashSet<String>) -> TreeNode {
    if let Some(name) = card.name.take() {
        card.fullname = name
            .nicknames
            .iter()
            .find(|n| n.selected)
            .map(|n| n.name.clone())
            .unwrap_or(name.first);
    }
    card.birth = None;
    card.death = None;
    card.profile_image = None;

    fn filter<T>(edges: &mut Vec<NodeRelation<T>>, present: &HashSet<String>, flag: &mut bool) {
        let before = edges.len();
        edges.retain(|e| present.contains(&e.id));
        if edges.len() < before {
            *flag = true;
        }
    }

    filter(&mut card.parents, present, &mut card.expandable.parents);
    filter(&mut card.children, present, &mut card.expandable.children);
    filter(&mut card.spouses, present, &mut card.expandable.spouses);
    filter(&mut card.siblings, present, &mut card.expandable.siblings);

    card
}

/// Project a fetched node set for the given viewer.
fn project_all(nodes: &[Node], viewer: Viewer) -> Vec<TreeNode> {
    let cards = nodes.iter().map(card_from);
    if viewer.is_public() {
        let present: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
        cards.map(|c| redact(c, &present)).collect()
    } else {
        cards.collect()
    }
}

/// Read-side query engine over the family graph.
pub struct TreeService {
    store: Arc<dyn NodeStore>,
}

impl TreeService {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// The anchor's household: the anchor plus every node one relation hop
    /// away or referencing the anchor in its own lists.
    pub async fn root(&self, id: &str, viewer: Viewer) -> Result<RootView> {
        let anchor = self
            .store
            .get_node(id)
            .await?
            .ok_or_else(|| FamilyServiceError::node_not_found(id))?;

        let household = self.store.household(id).await?;
        let data = project_all(&household, viewer);

        Ok(RootView {
            id: anchor.id.clone(),
            total: data.len(),
            is_root: anchor.is_root(),
            data,
        })
    }

    /// Household view of one uniformly random node. Empty store yields
    /// `None`, not an error.
    pub async fn sample_root(&self, viewer: Viewer) -> Result<Option<RootView>> {
        match self.store.sample().await? {
            Some(node) => Ok(Some(self.root(&node.id, viewer).await?)),
            None => Ok(None),
        }
    }

    /// Case-insensitive name search resolving to the matched node's
    /// household view. Whitespace runs in the query separate match tokens.
    pub async fn search(&self, query: &str, viewer: Viewer) -> Result<Option<RootView>> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            return Ok(None);
        }
        let pattern = format!("%{}%", tokens.join("%"));

        match self.store.search_by_name(&pattern).await? {
            Some(node) => Ok(Some(self.root(&node.id, viewer).await?)),
            None => Ok(None),
        }
    }

    /// The anchor plus the node set named by one of its relative lists.
    /// An empty list yields an empty `nodes`, not an error.
    pub async fn relatives(
        &self,
        id: &str,
        kind: RelativeKind,
        viewer: Viewer,
    ) -> Result<RelativesView> {
        let anchor = self
            .store
            .get_node(id)
            .await?
            .ok_or_else(|| FamilyServiceError::node_not_found(id))?;

        let ids = anchor.relative_ids(kind);
        let relatives = self.store.get_nodes(&ids).await?;

        let mut fetched = Vec::with_capacity(relatives.len() + 1);
        fetched.push(anchor);
        fetched.extend(relatives);

        let mut cards = project_all(&fetched, viewer);
        let node = cards.remove(0);
        Ok(RelativesView { node, nodes: cards })
    }

    /// The anchor's stored `families` list, no further traversal.
    pub async fn families_of(&self, id: &str) -> Result<FamiliesView> {
        let anchor = self
            .store
            .get_node(id)
            .await?
            .ok_or_else(|| FamilyServiceError::node_not_found(id))?;

        Ok(FamiliesView {
            id: anchor.id,
            total: anchor.families.len(),
            data: anchor.families,
        })
    }

    /// Every forest root (empty `families`), sorted by display name.
    ///
    /// Public viewers get the collapsed nickname-or-first-name for each
    /// head, the same name redaction every other read applies.
    pub async fn root_families(&self, viewer: Viewer) -> Result<Vec<FamilyHead>> {
        let roots = self.store.root_nodes().await?;
        let mut heads: Vec<FamilyHead> = roots
            .iter()
            .map(|n| FamilyHead {
                id: n.id.clone(),
                name: if viewer.is_public() {
                    n.public_name()
                } else {
                    n.fullname()
                },
            })
            .collect();
        heads.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(heads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, Nickname, PersonName};

    fn node(first: &str) -> Node {
        Node::new(
            PersonName {
                first: first.to_string(),
                middle: None,
                last: None,
                nicknames: Vec::new(),
            },
            Gender::Male,
            None,
        )
    }

    #[test]
    fn test_redaction_collapses_name_to_selected_nickname() {
        let mut n = node("muhammad");
        n.name.nicknames = vec![Nickname {
            name: "hakim".to_string(),
            selected: true,
        }];
        n.birth = Some(crate::models::BirthDate {
            year: 1990,
            month: 1,
            day: 1,
            place: None,
        });
        n.profile_image = Some("file-1".to_string());

        let card = redact(card_from(&n), &HashSet::new());
        assert_eq!(card.fullname, "hakim");
        assert!(card.name.is_none());
        assert!(card.birth.is_none());
        assert!(card.profile_image.is_none());
    }

    #[test]
    fn test_redaction_falls_back_to_first_name() {
        let n = node("muhammad");
        let card = redact(card_from(&n), &HashSet::new());
        assert_eq!(card.fullname, "muhammad");
    }

    #[test]
    fn test_redaction_filters_edges_and_flags_expandable() {
        let mut n = node("a");
        n.children
            .push(NodeRelation::new("present", ParentalRelation::Blood));
        n.children
            .push(NodeRelation::new("hidden", ParentalRelation::Blood));
        n.spouses
            .push(NodeRelation::new("present", SpousalRelation::Married));

        let present: HashSet<String> = ["present".to_string()].into_iter().collect();
        let card = redact(card_from(&n), &present);

        assert_eq!(card.children.len(), 1);
        assert!(card.expandable.children);
        assert!(!card.expandable.spouses);
        assert!(!card.expandable.parents);
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let mut n = node("a");
        n.name.nicknames = vec![Nickname {
            name: "nick".to_string(),
            selected: true,
        }];
        n.children
            .push(NodeRelation::new("hidden", ParentalRelation::Blood));

        let present = HashSet::new();
        let once = redact(card_from(&n), &present);
        let twice = redact(once.clone(), &present);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_authenticated_projection_keeps_everything() {
        let mut n = node("a");
        n.birth = Some(crate::models::BirthDate {
            year: 1990,
            month: 1,
            day: 1,
            place: None,
        });
        n.children
            .push(NodeRelation::new("elsewhere", ParentalRelation::Blood));

        let cards = project_all(std::slice::from_ref(&n), Viewer::Authenticated);
        assert!(cards[0].name.is_some());
        assert!(cards[0].birth.is_some());
        assert_eq!(cards[0].children.len(), 1);
        assert_eq!(cards[0].expandable, ExpandFlags::default());
    }
}
