//! Family Service - Relation Consistency Engine
//!
//! `FamilyService` owns every mutation of the family graph. Each operation
//! loads the affected nodes, computes the full set of relation-list edits in
//! memory, validates the domain invariants, persists the batch atomically
//! through the `NodeStore`, and finally broadcasts a `RelationChange` event.
//!
//! Invariants enforced here (checked before any write):
//!
//! 1. At most 2 parents; a parent pair differs in gender.
//! 2. Spouse count never exceeds the gender ceiling (male 4, female 1).
//! 3. Spouse edges are reciprocal with identical subtype.
//! 4. Parent/child edges are reciprocal in the complementary direction.
//! 5. Sibling edges are derived from shared parents, then persisted.
//! 6. `families` mirrors the parents' family lines.
//! 7. A node with children cannot be deleted.

use crate::db::{BulkPatch, NodeStore, RelationChange};
use crate::models::{
    contains_id, sibling_kind_for, ChildInput, Node, NodeFamily, NodeRelation, ParentalRelation,
    ParentsInput, PersonInput, ProfileImageInput, SpousalRelation, UpdateNodeInput,
};
use crate::services::error::FamilyServiceError;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the relation change broadcast channel.
///
/// Slow subscribers lag and miss events rather than backpressure mutations.
pub const RELATION_EVENT_CHANNEL_CAPACITY: usize = 128;

type Result<T> = std::result::Result<T, FamilyServiceError>;

/// Mutation engine for the family graph.
pub struct FamilyService {
    store: Arc<dyn NodeStore>,
    event_tx: broadcast::Sender<RelationChange>,
}

impl FamilyService {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        let (event_tx, _) = broadcast::channel(RELATION_EVENT_CHANNEL_CAPACITY);
        Self { store, event_tx }
    }

    /// Subscribe to committed relation changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RelationChange> {
        self.event_tx.subscribe()
    }

    /// Broadcast a committed change. Fire-and-forget: a send error only
    /// means nobody is listening.
    fn publish(&self, event: RelationChange) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("No active subscribers for relation change event");
        }
    }

    /// Load a node or fail with `NodeNotFound`.
    pub async fn find_node(&self, id: &str) -> Result<Node> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| FamilyServiceError::node_not_found(id))
    }

    /// Create a standalone person node with no relations.
    pub async fn create_node(&self, input: PersonInput) -> Result<Node> {
        let node = input.into_node();
        node.validate()?;

        let node = self.store.insert(node).await?;
        tracing::debug!(node_id = %node.id, "Created standalone node");

        self.publish(RelationChange::added(vec![node.id.clone()]));
        Ok(node)
    }

    /// Attach a brand-new parent pair to a parentless anchor.
    ///
    /// The parents become mutual married spouses, the anchor gains two blood
    /// parent edges and two `families` entries, and every node whose
    /// `families` still pointed at the anchor as a root ancestor is
    /// re-anchored onto the new parents. All of it commits in one
    /// transaction. Returns the two created parents (father first).
    pub async fn create_parents(&self, id: &str, input: ParentsInput) -> Result<Vec<Node>> {
        let mut anchor = self.find_node(id).await?;

        if !anchor.parents.is_empty() {
            return Err(FamilyServiceError::invariant("Node parents existed"));
        }
        if input.father.gender == input.mother.gender {
            return Err(FamilyServiceError::invariant("Forbidden same gender parent"));
        }

        let mut father = input.father.into_node();
        let mut mother = input.mother.into_node();
        father.validate()?;
        mother.validate()?;

        // Parent pair are mutual married spouses.
        father
            .spouses
            .push(NodeRelation::new(mother.id.clone(), SpousalRelation::Married));
        mother
            .spouses
            .push(NodeRelation::new(father.id.clone(), SpousalRelation::Married));

        for parent in [&mut father, &mut mother] {
            parent
                .children
                .push(NodeRelation::new(anchor.id.clone(), ParentalRelation::Blood));
            anchor
                .parents
                .push(NodeRelation::new(parent.id.clone(), ParentalRelation::Blood));
            anchor
                .families
                .push(NodeFamily::new(parent.id.clone(), parent.fullname()));
        }

        // Root-family migration: downstream nodes that treated the anchor as
        // their top-most ancestor now point at the new parents instead.
        let patch = BulkPatch::ReanchorFamilies {
            old_root_id: anchor.id.clone(),
            replacements: vec![
                NodeFamily::new(father.id.clone(), father.fullname()),
                NodeFamily::new(mother.id.clone(), mother.fullname()),
            ],
        };

        let affected = vec![father.id.clone(), mother.id.clone(), anchor.id.clone()];
        self.store
            .bulk_save(&[father.clone(), mother.clone(), anchor], &[patch])
            .await?;

        tracing::debug!(anchor_id = %id, "Attached parent pair");
        self.publish(RelationChange::added(affected));
        Ok(vec![father, mother])
    }

    /// Attach one or more brand-new spouse nodes to the anchor.
    pub async fn create_spouses(&self, id: &str, inputs: Vec<PersonInput>) -> Result<Vec<Node>> {
        let mut anchor = self.find_node(id).await?;

        let ceiling = anchor.max_spouses();
        if anchor.total_spouses(SpousalRelation::Married) + inputs.len() > ceiling {
            return Err(FamilyServiceError::invariant(format!(
                "Max {ceiling} spouses"
            )));
        }
        if !inputs.iter().any(|s| s.gender != anchor.gender) {
            return Err(FamilyServiceError::invariant("Same gender not allowed"));
        }

        let mut spouses = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut spouse = input.into_node();
            spouse.validate()?;
            spouse
                .spouses
                .push(NodeRelation::new(anchor.id.clone(), SpousalRelation::Married));
            anchor
                .spouses
                .push(NodeRelation::new(spouse.id.clone(), SpousalRelation::Married));
            spouses.push(spouse);
        }

        let mut batch = spouses.clone();
        batch.push(anchor);
        let affected: Vec<String> = batch.iter().map(|n| n.id.clone()).collect();
        self.store.bulk_save(&batch, &[]).await?;

        tracing::debug!(anchor_id = %id, count = spouses.len(), "Attached spouses");
        self.publish(RelationChange::added(affected));
        Ok(spouses)
    }

    /// Attach a brand-new child to a married couple.
    ///
    /// The sibling set is derived as the intersection of both parents'
    /// existing children and persisted on both sides of every new sibling
    /// edge. The child's `families` is the union of both parents' lines, or
    /// the parent itself when the parent is a root.
    pub async fn create_child(&self, id: &str, input: ChildInput) -> Result<Node> {
        self.find_node(id).await?;

        let pair = self.store.married_pair(id, &input.spouse_id).await?;
        if pair.len() != 2 {
            return Err(FamilyServiceError::invariant("Node not married yet"));
        }
        let mut anchor = None;
        let mut spouse = None;
        for node in pair {
            if node.id == id {
                anchor = Some(node);
            } else {
                spouse = Some(node);
            }
        }
        let (mut anchor, mut spouse) = match (anchor, spouse) {
            (Some(a), Some(s)) => (a, s),
            _ => return Err(FamilyServiceError::invariant("Node not married yet")),
        };

        let mut child = input.child.into_node();
        child.validate()?;

        // Siblings by shared parents: children both parents already have in
        // common. The sibling subtype follows the existing child edge's
        // subtype (blood child of both -> blood sibling, adoptive -> half).
        let mut siblings = Vec::new();
        for edge in &anchor.children {
            if contains_id(&spouse.children, &edge.id) {
                if let Some(mut sibling) = self.store.get_node(&edge.id).await? {
                    let kind = sibling_kind_for(edge.kind);
                    sibling
                        .siblings
                        .push(NodeRelation::new(child.id.clone(), kind));
                    child
                        .siblings
                        .push(NodeRelation::new(sibling.id.clone(), kind));
                    siblings.push(sibling);
                }
            }
        }

        for parent in [&mut anchor, &mut spouse] {
            parent
                .children
                .push(NodeRelation::new(child.id.clone(), ParentalRelation::Blood));
            child
                .parents
                .push(NodeRelation::new(parent.id.clone(), ParentalRelation::Blood));

            if parent.is_root() {
                child
                    .families
                    .push(NodeFamily::new(parent.id.clone(), parent.fullname()));
            } else {
                for family in &parent.families {
                    if !child.families.iter().any(|f| f.id == family.id) {
                        child.families.push(family.clone());
                    }
                }
            }
        }

        let mut batch = vec![child.clone(), anchor, spouse];
        batch.extend(siblings);
        let affected: Vec<String> = batch.iter().map(|n| n.id.clone()).collect();
        self.store.bulk_save(&batch, &[]).await?;

        tracing::debug!(anchor_id = %id, child_id = %child.id, "Attached child");
        self.publish(RelationChange::added(affected));
        Ok(child)
    }

    /// Attach a sibling by delegating to `create_child` with the anchor's
    /// parent pair, inheriting the full sibling-set derivation.
    pub async fn create_sibling(&self, id: &str, input: PersonInput) -> Result<Node> {
        let anchor = self.find_node(id).await?;

        if anchor.parents.len() != 2 {
            return Err(FamilyServiceError::invariant("Node parent not found"));
        }

        let father_id = anchor.parents[0].id.clone();
        let spouse_id = anchor.parents[1].id.clone();
        self.create_child(
            &father_id,
            ChildInput {
                spouse_id,
                child: input,
            },
        )
        .await
    }

    /// Partial field update of name, nicknames, gender, birth and death.
    ///
    /// Omitted `birth`/`death` are explicitly cleared. A gender change is
    /// rejected once the node holds any spouse edge. When the display name
    /// changes, every `families` entry caching it is rewritten in the same
    /// transaction.
    pub async fn update_node(&self, id: &str, input: UpdateNodeInput) -> Result<Node> {
        let mut node = self.find_node(id).await?;
        let old_fullname = node.fullname();

        if let Some(gender) = input.gender {
            if gender != node.gender && !node.spouses.is_empty() {
                return Err(FamilyServiceError::invariant("Gender cannot be changed"));
            }
            node.gender = gender;
        }

        if let Some(name) = input.name {
            node.name.first = name.first;
            node.name.middle = name.middle;
            node.name.last = name.last;
        }
        if let Some(nicknames) = input.nicknames {
            node.name.nicknames = nicknames;
        }

        node.birth = input.birth;
        node.death = input.death;
        node.validate()?;
        node.modified_at = chrono::Utc::now();

        let mut patches = Vec::new();
        let new_fullname = node.fullname();
        if new_fullname != old_fullname {
            patches.push(BulkPatch::RenameFamily {
                family_id: node.id.clone(),
                name: new_fullname,
            });
        }

        self.store.bulk_save(&[node.clone()], &patches).await?;

        tracing::debug!(node_id = %id, "Updated node fields");
        self.publish(RelationChange::added(vec![node.id.clone()]));
        Ok(node)
    }

    /// Set or clear the profile image reference.
    pub async fn update_profile(&self, id: &str, input: ProfileImageInput) -> Result<Node> {
        let mut node = self.find_node(id).await?;
        node.profile_image = input.file_id;
        node.modified_at = chrono::Utc::now();

        self.store.bulk_save(&[node.clone()], &[]).await?;

        self.publish(RelationChange::added(vec![node.id.clone()]));
        Ok(node)
    }

    /// Delete a childless node and strip its id from every other node's
    /// relation and `families` lists.
    ///
    /// Returns the previously-linked neighbor ids so callers can refresh
    /// affected viewers.
    pub async fn delete_node(&self, id: &str) -> Result<Vec<String>> {
        let node = self.find_node(id).await?;

        if !node.children.is_empty() {
            return Err(FamilyServiceError::invariant("Node children existed"));
        }

        let neighbors = node.neighbor_ids();
        let deleted = self.store.delete_cascade(id).await?;
        if !deleted {
            return Err(FamilyServiceError::node_not_found(id));
        }

        tracing::debug!(node_id = %id, neighbors = neighbors.len(), "Deleted node");
        self.publish(RelationChange::removed(neighbors.clone()));
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TursoStore;
    use crate::models::{Gender, PersonName};
    use tempfile::TempDir;

    async fn service() -> (FamilyService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = TursoStore::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (FamilyService::new(Arc::new(store)), temp_dir)
    }

    fn person(first: &str, gender: Gender) -> PersonInput {
        PersonInput {
            name: PersonName {
                first: first.to_string(),
                middle: None,
                last: None,
                nicknames: Vec::new(),
            },
            gender,
            birth: None,
        }
    }

    #[tokio::test]
    async fn test_create_node_rejects_blank_first_name() {
        let (svc, _dir) = service().await;
        let result = svc.create_node(person("  ", Gender::Male)).await;
        assert!(matches!(
            result,
            Err(FamilyServiceError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_create_parents_rejects_same_gender() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("adam", Gender::Male)).await.unwrap();

        let result = svc
            .create_parents(
                &anchor.id,
                ParentsInput {
                    father: person("a", Gender::Male),
                    mother: person("b", Gender::Male),
                },
            )
            .await;

        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Forbidden same gender parent")
        );
        // No side effects: the anchor is still a root without parents.
        let anchor = svc.find_node(&anchor.id).await.unwrap();
        assert!(anchor.parents.is_empty());
    }

    #[tokio::test]
    async fn test_create_parents_rejects_existing_parents() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("adam", Gender::Male)).await.unwrap();
        svc.create_parents(
            &anchor.id,
            ParentsInput {
                father: person("f", Gender::Male),
                mother: person("m", Gender::Female),
            },
        )
        .await
        .unwrap();

        let result = svc
            .create_parents(
                &anchor.id,
                ParentsInput {
                    father: person("f2", Gender::Male),
                    mother: person("m2", Gender::Female),
                },
            )
            .await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Node parents existed")
        );
    }

    #[tokio::test]
    async fn test_spouse_ceiling_per_gender() {
        let (svc, _dir) = service().await;
        let wife = svc.create_node(person("eve", Gender::Female)).await.unwrap();
        svc.create_spouses(&wife.id, vec![person("h1", Gender::Male)])
            .await
            .unwrap();

        let result = svc
            .create_spouses(&wife.id, vec![person("h2", Gender::Male)])
            .await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Max 1 spouses")
        );
    }

    #[tokio::test]
    async fn test_create_spouses_rejects_all_same_gender() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("adam", Gender::Male)).await.unwrap();

        let result = svc
            .create_spouses(&anchor.id, vec![person("b", Gender::Male)])
            .await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Same gender not allowed")
        );
    }

    #[tokio::test]
    async fn test_create_child_requires_marriage() {
        let (svc, _dir) = service().await;
        let a = svc.create_node(person("a", Gender::Male)).await.unwrap();
        let b = svc.create_node(person("b", Gender::Female)).await.unwrap();

        let result = svc
            .create_child(
                &a.id,
                ChildInput {
                    spouse_id: b.id.clone(),
                    child: person("c", Gender::Male),
                },
            )
            .await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Node not married yet")
        );
    }

    #[tokio::test]
    async fn test_create_sibling_requires_parent_pair() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("solo", Gender::Male)).await.unwrap();

        let result = svc
            .create_sibling(&anchor.id, person("sib", Gender::Female))
            .await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Node parent not found")
        );
    }

    #[tokio::test]
    async fn test_gender_change_blocked_after_marriage() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("adam", Gender::Male)).await.unwrap();
        svc.create_spouses(&anchor.id, vec![person("eve", Gender::Female)])
            .await
            .unwrap();

        let result = svc
            .update_node(
                &anchor.id,
                UpdateNodeInput {
                    gender: Some(Gender::Female),
                    ..Default::default()
                },
            )
            .await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Gender cannot be changed")
        );

        // Restating the current gender is not a change and passes.
        let updated = svc
            .update_node(
                &anchor.id,
                UpdateNodeInput {
                    gender: Some(Gender::Male),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.gender, Gender::Male);
    }

    #[tokio::test]
    async fn test_update_clears_omitted_birth() {
        let (svc, _dir) = service().await;
        let mut input = person("adam", Gender::Male);
        input.birth = Some(crate::models::BirthDate {
            year: 1990,
            month: 6,
            day: 15,
            place: None,
        });
        let anchor = svc.create_node(input).await.unwrap();
        assert!(anchor.birth.is_some());

        let updated = svc
            .update_node(&anchor.id, UpdateNodeInput::default())
            .await
            .unwrap();
        assert!(updated.birth.is_none());

        let reloaded = svc.find_node(&anchor.id).await.unwrap();
        assert!(reloaded.birth.is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_node_with_children() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("kid", Gender::Male)).await.unwrap();
        let parents = svc
            .create_parents(
                &anchor.id,
                ParentsInput {
                    father: person("f", Gender::Male),
                    mother: person("m", Gender::Female),
                },
            )
            .await
            .unwrap();

        let result = svc.delete_node(&parents[0].id).await;
        assert!(
            matches!(result, Err(FamilyServiceError::InvariantViolation(ref m)) if m == "Node children existed")
        );
        // Graph unchanged.
        assert!(svc.find_node(&parents[0].id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_returns_neighbor_ids() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("kid", Gender::Male)).await.unwrap();
        let parents = svc
            .create_parents(
                &anchor.id,
                ParentsInput {
                    father: person("f", Gender::Male),
                    mother: person("m", Gender::Female),
                },
            )
            .await
            .unwrap();

        let neighbors = svc.delete_node(&anchor.id).await.unwrap();
        assert!(neighbors.contains(&parents[0].id));
        assert!(neighbors.contains(&parents[1].id));
        assert!(matches!(
            svc.find_node(&anchor.id).await,
            Err(FamilyServiceError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_image_set_and_clear() {
        let (svc, _dir) = service().await;
        let anchor = svc.create_node(person("adam", Gender::Male)).await.unwrap();

        let updated = svc
            .update_profile(
                &anchor.id,
                ProfileImageInput {
                    file_id: Some("file-123".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.profile_image.as_deref(), Some("file-123"));

        let cleared = svc
            .update_profile(&anchor.id, ProfileImageInput { file_id: None })
            .await
            .unwrap();
        assert!(cleared.profile_image.is_none());
    }
}
