//! TursoStore - NodeStore implementation backed by libsql
//!
//! Wraps `DatabaseService` and owns the conversion between the `Node` model
//! and the JSON-column row layout. All business logic stays above the
//! `NodeStore` trait; this layer is pure persistence.

use crate::db::database::{DatabaseService, DbNodeParams};
use crate::db::node_store::{BulkPatch, NodeStore};
use crate::models::{Gender, Node};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Value;
use std::path::PathBuf;

/// libsql-backed node store
#[derive(Debug, Clone)]
pub struct TursoStore {
    db: DatabaseService,
}

/// Owned row image of a node, serialized once per save so the borrowed
/// `DbNodeParams` can be built for the whole batch.
struct SerializedNode {
    id: String,
    name: String,
    gender: &'static str,
    birth: Option<String>,
    death: Option<String>,
    profile_image: Option<String>,
    parents: String,
    children: String,
    spouses: String,
    siblings: String,
    families: String,
    owner_user_id: Option<String>,
}

impl SerializedNode {
    fn from_node(node: &Node) -> Result<Self> {
        Ok(Self {
            id: node.id.clone(),
            name: serde_json::to_string(&node.name).context("Failed to serialize name")?,
            gender: node.gender.as_str(),
            birth: node
                .birth
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to serialize birth")?,
            death: node
                .death
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("Failed to serialize death")?,
            profile_image: node.profile_image.clone(),
            parents: serde_json::to_string(&node.parents).context("Failed to serialize parents")?,
            children: serde_json::to_string(&node.children)
                .context("Failed to serialize children")?,
            spouses: serde_json::to_string(&node.spouses).context("Failed to serialize spouses")?,
            siblings: serde_json::to_string(&node.siblings)
                .context("Failed to serialize siblings")?,
            families: serde_json::to_string(&node.families)
                .context("Failed to serialize families")?,
            owner_user_id: node.owner_user_id.clone(),
        })
    }

    fn as_params(&self) -> DbNodeParams<'_> {
        DbNodeParams {
            id: &self.id,
            name: &self.name,
            gender: self.gender,
            birth: self.birth.as_deref(),
            death: self.death.as_deref(),
            profile_image: self.profile_image.as_deref(),
            parents: &self.parents,
            children: &self.children,
            spouses: &self.spouses,
            siblings: &self.siblings,
            families: &self.families,
            owner_user_id: self.owner_user_id.as_deref(),
        }
    }
}

impl TursoStore {
    /// Open (or create) the store at the given path.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        let db = DatabaseService::new(db_path)
            .await
            .context("Failed to open database")?;
        Ok(Self { db })
    }

    /// Wrap an existing database service.
    pub fn with_database(db: DatabaseService) -> Self {
        Self { db }
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339
    /// formats.
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        Err(anyhow::anyhow!(
            "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
            s
        ))
    }

    /// Required text column at `idx`.
    fn col_text(row: &[Value], idx: usize) -> Result<String> {
        match row.get(idx) {
            Some(Value::Text(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(anyhow::anyhow!("Null value")),
            Some(other) => Err(anyhow::anyhow!("Unexpected value type: {:?}", other)),
        }
    }

    /// Nullable text column at `idx`.
    fn col_opt_text(row: &[Value], idx: usize) -> Result<Option<String>> {
        match row.get(idx) {
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(anyhow::anyhow!("Unexpected value type: {:?}", other)),
        }
    }

    /// Convert a decoded libsql row to the Node model.
    ///
    /// Expected columns, in order: id, name, gender, birth, death,
    /// profile_image, parents, children, spouses, siblings, families,
    /// owner_user_id, created_at, modified_at.
    fn row_to_node(row: &[Value]) -> Result<Node> {
        let id: String = Self::col_text(row, 0).context("Failed to get id")?;
        let name_json: String = Self::col_text(row, 1).context("Failed to get name")?;
        let gender_str: String = Self::col_text(row, 2).context("Failed to get gender")?;
        let birth_json: Option<String> = Self::col_opt_text(row, 3).context("Failed to get birth")?;
        let death_json: Option<String> = Self::col_opt_text(row, 4).context("Failed to get death")?;
        let profile_image: Option<String> =
            Self::col_opt_text(row, 5).context("Failed to get profile_image")?;
        let parents_json: String = Self::col_text(row, 6).context("Failed to get parents")?;
        let children_json: String = Self::col_text(row, 7).context("Failed to get children")?;
        let spouses_json: String = Self::col_text(row, 8).context("Failed to get spouses")?;
        let siblings_json: String = Self::col_text(row, 9).context("Failed to get siblings")?;
        let families_json: String = Self::col_text(row, 10).context("Failed to get families")?;
        let owner_user_id: Option<String> =
            Self::col_opt_text(row, 11).context("Failed to get owner_user_id")?;
        let created_at_str: String = Self::col_text(row, 12).context("Failed to get created_at")?;
        let modified_at_str: String =
            Self::col_text(row, 13).context("Failed to get modified_at")?;

        let gender = match gender_str.as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            other => anyhow::bail!("Unknown gender value '{}'", other),
        };

        Ok(Node {
            id,
            name: serde_json::from_str(&name_json).context("Failed to parse name JSON")?,
            gender,
            birth: birth_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Failed to parse birth JSON")?,
            death: death_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Failed to parse death JSON")?,
            profile_image,
            parents: serde_json::from_str(&parents_json).context("Failed to parse parents")?,
            children: serde_json::from_str(&children_json).context("Failed to parse children")?,
            spouses: serde_json::from_str(&spouses_json).context("Failed to parse spouses")?,
            siblings: serde_json::from_str(&siblings_json).context("Failed to parse siblings")?,
            families: serde_json::from_str(&families_json).context("Failed to parse families")?,
            owner_user_id,
            created_at: Self::parse_timestamp(&created_at_str)
                .context("Failed to parse created_at")?,
            modified_at: Self::parse_timestamp(&modified_at_str)
                .context("Failed to parse modified_at")?,
        })
    }

    fn rows_to_nodes(rows: Vec<Vec<Value>>) -> Result<Vec<Node>> {
        rows.iter().map(|row| Self::row_to_node(row)).collect()
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn insert(&self, node: Node) -> Result<Node> {
        let serialized = SerializedNode::from_node(&node)?;
        self.db
            .db_insert_node(serialized.as_params())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to insert node: {}", e))?;

        self.get_node(&node.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Node not found after insert"))
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        match self
            .db
            .db_get_node(id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get node: {}", e))?
        {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.get_node(id).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    async fn married_pair(&self, a: &str, b: &str) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_married_pair(a, b)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to query married pair: {}", e))?;
        Self::rows_to_nodes(rows)
    }

    async fn search_by_name(&self, pattern: &str) -> Result<Option<Node>> {
        match self
            .db
            .db_search_name(pattern)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to search by name: {}", e))?
        {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn household(&self, id: &str) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_household(id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to query household: {}", e))?;
        Self::rows_to_nodes(rows)
    }

    async fn root_nodes(&self) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_root_nodes()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to query root nodes: {}", e))?;
        Self::rows_to_nodes(rows)
    }

    async fn sample(&self) -> Result<Option<Node>> {
        match self
            .db
            .db_sample()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to sample node: {}", e))?
        {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn bulk_save(&self, nodes: &[Node], patches: &[BulkPatch]) -> Result<()> {
        let serialized: Vec<SerializedNode> = nodes
            .iter()
            .map(SerializedNode::from_node)
            .collect::<Result<_>>()?;
        let params: Vec<DbNodeParams<'_>> = serialized.iter().map(|s| s.as_params()).collect();

        self.db
            .db_bulk_save(&params, patches)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bulk save nodes: {}", e))
    }

    async fn delete_cascade(&self, id: &str) -> Result<bool> {
        self.db
            .db_delete_cascade(id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete node: {}", e))
    }
}
