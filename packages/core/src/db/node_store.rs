//! NodeStore Trait - Database Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts persistence for
//! person nodes. The trait sits between `FamilyService`/`TreeService`
//! (business logic) and the storage backend, so graph algorithms operate by
//! id lookup through the store and never hold owning pointers into the graph.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: all methods are async to match the embedded libsql
//!    backend and keep the seam open for networked backends.
//! 2. **Typed queries**: the handful of traversal shapes the tree engine
//!    needs (household aggregation, married-pair check, root listing, name
//!    search, random sample) are first-class methods rather than a generic
//!    predicate language - there is deliberately no query language here.
//! 3. **Transactional writes**: `bulk_save` and `delete_cascade` are the
//!    units of atomicity for multi-document relation edits. All documents in
//!    one relation-attach or delete commit together or not at all; a
//!    reciprocal edge is never observable half-written.
//! 4. **Error handling**: `anyhow::Result` for flexible error context;
//!    "not found" is expressed through `Option`, everything else is a
//!    persistence failure.

use crate::models::{Node, NodeFamily};
use anyhow::Result;
use async_trait::async_trait;

/// A bulk cross-reference rewrite applied to every matching document, inside
/// the same transaction as the `bulk_save` that triggered it.
///
/// These are the two materialized-view maintenance operations of the graph:
/// re-anchoring the derived `families` lists when a new top-most ancestor
/// pair appears, and rewriting the denormalized family display name when a
/// root ancestor is renamed.
#[derive(Debug, Clone)]
pub enum BulkPatch {
    /// Every node whose `families` references `old_root_id` gets the
    /// `replacements` entries appended and the stale entry removed.
    ReanchorFamilies {
        old_root_id: String,
        replacements: Vec<NodeFamily>,
    },

    /// Every `families` entry pointing at `family_id` gets its cached
    /// display name rewritten to `name`.
    RenameFamily { family_id: String, name: String },
}

/// Abstraction layer for person-node persistence.
///
/// Implementations must be `Send + Sync` to allow usage in async contexts
/// where futures may be moved between threads.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert a brand-new node. Fails on duplicate id.
    async fn insert(&self, node: Node) -> Result<Node>;

    /// Point lookup by id. `Ok(None)` when the node does not exist.
    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    /// Fetch several nodes by id; missing ids are silently skipped.
    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>>;

    /// Fetch the pair (`a`, `b`) only if both exist and `a` lists `b` as a
    /// spouse or `b` lists `a`. Returns fewer than two nodes otherwise.
    async fn married_pair(&self, a: &str, b: &str) -> Result<Vec<Node>>;

    /// First node whose name parts or nicknames match the lowercase LIKE
    /// pattern.
    async fn search_by_name(&self, pattern: &str) -> Result<Option<Node>>;

    /// The anchor plus every node holding the anchor's id in any relation
    /// list or `families` entry - the bounded "household" subgraph.
    async fn household(&self, id: &str) -> Result<Vec<Node>>;

    /// All forest roots (nodes with an empty `families` list).
    async fn root_nodes(&self) -> Result<Vec<Node>>;

    /// One node picked uniformly at random, if any exist.
    async fn sample(&self) -> Result<Option<Node>>;

    /// Upsert a batch of already-mutated nodes and apply the bulk
    /// cross-reference rewrites, all in one transaction.
    async fn bulk_save(&self, nodes: &[Node], patches: &[BulkPatch]) -> Result<()>;

    /// Delete a node and pull its id out of every other node's relation and
    /// `families` lists, in one transaction. Returns `false` when the node
    /// did not exist.
    async fn delete_cascade(&self, id: &str) -> Result<bool>;
}
