//! Database Connection Management
//!
//! This module provides the core database connection, schema initialization
//! and the typed SQL operations for the family graph, using libsql.
//!
//! # Architecture
//!
//! - **Single collection**: one `nodes` table; each row embeds its relation
//!   edge lists and `families` list as JSON columns. This denormalization is
//!   deliberate - it trades join cost for single-document reads and lets the
//!   household aggregation run as one query over `json_each`.
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Transactions**: every multi-document write (`db_bulk_save`,
//!   `db_delete_cascade`) runs inside `BEGIN TRANSACTION`/`COMMIT` with
//!   rollback on failure, so reciprocal edges are never half-committed.
//!
//! # Database Connection Patterns
//!
//! Always use `connect_with_timeout()` in async functions. The 5-second busy
//! timeout allows concurrent operations to wait and retry instead of failing
//! immediately with `SQLITE_BUSY` errors when the Tokio runtime interleaves
//! writers.

use crate::db::error::DatabaseError;
use crate::db::node_store::BulkPatch;
use libsql::{params, Builder, Connection, Database, Row, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Column list shared by every SELECT so `row_to_node` can rely on one
/// stable column order.
pub const NODE_COLUMNS: &str = "id, name, gender, birth, death, profile_image, \
     parents, children, spouses, siblings, families, owner_user_id, \
     created_at, modified_at";

/// Parameters for node insertion/upsert (avoids too-many-arguments lint).
///
/// JSON columns arrive pre-serialized; the store layer owns the conversion
/// between `Node` and these strings.
pub struct DbNodeParams<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub gender: &'a str,
    pub birth: Option<&'a str>,
    pub death: Option<&'a str>,
    pub profile_image: Option<&'a str>,
    pub parents: &'a str,
    pub children: &'a str,
    pub spouses: &'a str,
    pub siblings: &'a str,
    pub families: &'a str,
    pub owner_user_id: Option<&'a str>,
}

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path.
    ///
    /// Ensures the parent directory exists, opens/creates the database file
    /// and initializes the schema (idempotent).
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema().await?;

        Ok(service)
    }

    /// Get a synchronous connection handle.
    ///
    /// Prefer `connect_with_timeout()` in async code.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with the busy timeout configured.
    ///
    /// The 5s busy timeout makes concurrent operations wait and retry
    /// instead of failing immediately when the database is locked.
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        Ok(conn)
    }

    /// Execute a PRAGMA statement.
    ///
    /// PRAGMA statements return rows, so we must use query() instead of
    /// execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration.
    ///
    /// Creates the `nodes` table and indexes with CREATE TABLE IF NOT
    /// EXISTS, so initialization is safe to run repeatedly.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;
        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name JSON NOT NULL,
                gender TEXT NOT NULL,
                birth JSON,
                death JSON,
                profile_image TEXT,
                parents JSON NOT NULL DEFAULT '[]',
                children JSON NOT NULL DEFAULT '[]',
                spouses JSON NOT NULL DEFAULT '[]',
                siblings JSON NOT NULL DEFAULT '[]',
                families JSON NOT NULL DEFAULT '[]',
                owner_user_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create nodes table: {}", e))
        })?;

        // First-name index backs the name search; the families-size index
        // backs the root directory listing.
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_first_name \
             ON nodes(json_extract(name, '$.first'))",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create index 'idx_nodes_first_name': {}",
                e
            ))
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_family_count \
             ON nodes(json_array_length(families))",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create index 'idx_nodes_family_count': {}",
                e
            ))
        })?;

        Ok(())
    }

    //
    // NODE STORE OPERATIONS
    // Typed SQL extracted behind the NodeStore trait implementation.
    //

    /// Insert a node. Fails on duplicate id.
    pub async fn db_insert_node(&self, p: DbNodeParams<'_>) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO nodes (id, name, gender, birth, death, profile_image, \
             parents, children, spouses, siblings, families, owner_user_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                p.id,
                p.name,
                p.gender,
                p.birth,
                p.death,
                p.profile_image,
                p.parents,
                p.children,
                p.spouses,
                p.siblings,
                p.families,
                p.owner_user_id,
            ],
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;
        Ok(())
    }

    /// Retrieve a single node row by id.
    pub async fn db_get_node(&self, id: &str) -> Result<Option<Vec<Value>>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS);
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare get_node query: {}", e))
        })?;
        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
        })?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_values(&row)?)),
            None => Ok(None),
        }
    }

    /// The anchor plus every row referencing the anchor id in any relation
    /// list or `families` entry.
    pub async fn db_household(&self, id: &str) -> Result<Vec<Vec<Value>>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let sql = format!(
            "SELECT {} FROM nodes WHERE id = ?1 \
             OR EXISTS (SELECT 1 FROM json_each(nodes.families) AS f \
                        WHERE json_extract(f.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.spouses) AS s \
                        WHERE json_extract(s.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.children) AS c \
                        WHERE json_extract(c.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.siblings) AS sb \
                        WHERE json_extract(sb.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.parents) AS p \
                        WHERE json_extract(p.value, '$.id') = ?1)",
            NODE_COLUMNS
        );
        self.query_rows(&conn, &sql, [id]).await
    }

    /// Fetch the (`a`, `b`) pair only when one side lists the other as a
    /// spouse.
    pub async fn db_married_pair(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Vec<Vec<Value>>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let sql = format!(
            "SELECT {} FROM nodes WHERE \
             (id = ?1 AND EXISTS (SELECT 1 FROM json_each(nodes.spouses) AS s \
                                  WHERE json_extract(s.value, '$.id') = ?2)) \
             OR (id = ?2 AND EXISTS (SELECT 1 FROM json_each(nodes.spouses) AS s \
                                     WHERE json_extract(s.value, '$.id') = ?1))",
            NODE_COLUMNS
        );
        self.query_rows(&conn, &sql, [a, b]).await
    }

    /// First row whose name parts or nicknames match the LIKE pattern.
    pub async fn db_search_name(&self, pattern: &str) -> Result<Option<Vec<Value>>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let sql = format!(
            "SELECT {} FROM nodes WHERE \
             lower(json_extract(name, '$.first')) LIKE ?1 \
             OR lower(json_extract(name, '$.middle')) LIKE ?1 \
             OR lower(json_extract(name, '$.last')) LIKE ?1 \
             OR EXISTS (SELECT 1 FROM json_each(COALESCE(json_extract(nodes.name, '$.nicknames'), '[]')) AS n \
                        WHERE lower(json_extract(n.value, '$.name')) LIKE ?1) \
             LIMIT 1",
            NODE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare search query: {}", e))
        })?;
        let mut rows = stmt.query([pattern]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute search query: {}", e))
        })?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_values(&row)?)),
            None => Ok(None),
        }
    }

    /// All rows with an empty `families` list (forest roots).
    pub async fn db_root_nodes(&self) -> Result<Vec<Vec<Value>>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let sql = format!(
            "SELECT {} FROM nodes WHERE json_array_length(families) = 0",
            NODE_COLUMNS
        );
        self.query_rows(&conn, &sql, ()).await
    }

    /// One row picked uniformly at random.
    pub async fn db_sample(&self) -> Result<Option<Vec<Value>>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let sql = format!(
            "SELECT {} FROM nodes ORDER BY RANDOM() LIMIT 1",
            NODE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare sample query: {}", e))
        })?;
        let mut rows = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute sample query: {}", e))
        })?;
        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_values(&row)?)),
            None => Ok(None),
        }
    }

    /// Upsert a batch of nodes and apply bulk cross-reference rewrites in a
    /// single transaction.
    ///
    /// This is the atomicity unit for multi-node relation edits: either the
    /// whole batch (and every dependent `families` rewrite) commits, or none
    /// of it does.
    pub async fn db_bulk_save(
        &self,
        nodes: &[DbNodeParams<'_>],
        patches: &[BulkPatch],
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        for p in nodes {
            let result = conn
                .execute(
                    "INSERT INTO nodes (id, name, gender, birth, death, profile_image, \
                     parents, children, spouses, siblings, families, owner_user_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                     ON CONFLICT(id) DO UPDATE SET \
                     name = excluded.name, gender = excluded.gender, \
                     birth = excluded.birth, death = excluded.death, \
                     profile_image = excluded.profile_image, \
                     parents = excluded.parents, children = excluded.children, \
                     spouses = excluded.spouses, siblings = excluded.siblings, \
                     families = excluded.families, \
                     owner_user_id = excluded.owner_user_id, \
                     modified_at = CURRENT_TIMESTAMP",
                    params![
                        p.id,
                        p.name,
                        p.gender,
                        p.birth,
                        p.death,
                        p.profile_image,
                        p.parents,
                        p.children,
                        p.spouses,
                        p.siblings,
                        p.families,
                        p.owner_user_id,
                    ],
                )
                .await;

            if let Err(e) = result {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to save node '{}': {}",
                    p.id, e
                )));
            }
        }

        for patch in patches {
            if let Err(e) = self.apply_patch(&conn, patch).await {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(e);
            }
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(())
    }

    /// Apply one bulk rewrite on the open transaction's connection.
    async fn apply_patch(&self, conn: &Connection, patch: &BulkPatch) -> Result<(), DatabaseError> {
        match patch {
            BulkPatch::ReanchorFamilies {
                old_root_id,
                replacements,
            } => {
                // Append the replacement entries to every row still pointing
                // at the old root, then pull the stale entry. Two steps so
                // each statement stays a single-level correlated rewrite.
                for entry in replacements {
                    let entry_json = serde_json::to_string(entry).map_err(|e| {
                        DatabaseError::sql_execution(format!(
                            "Failed to serialize family entry: {}",
                            e
                        ))
                    })?;
                    conn.execute(
                        "UPDATE nodes \
                         SET families = json_insert(families, '$[#]', json(?2)), \
                             modified_at = CURRENT_TIMESTAMP \
                         WHERE EXISTS (SELECT 1 FROM json_each(nodes.families) AS f \
                                       WHERE json_extract(f.value, '$.id') = ?1)",
                        params![old_root_id.as_str(), entry_json],
                    )
                    .await
                    .map_err(|e| {
                        DatabaseError::sql_execution(format!(
                            "Failed to append family entry: {}",
                            e
                        ))
                    })?;
                }

                conn.execute(
                    "UPDATE nodes \
                     SET families = (SELECT COALESCE(json_group_array(json(f.value)), '[]') \
                                     FROM json_each(nodes.families) AS f \
                                     WHERE json_extract(f.value, '$.id') <> ?1), \
                         modified_at = CURRENT_TIMESTAMP \
                     WHERE EXISTS (SELECT 1 FROM json_each(nodes.families) AS f \
                                   WHERE json_extract(f.value, '$.id') = ?1)",
                    params![old_root_id.as_str()],
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to pull stale family entry: {}",
                        e
                    ))
                })?;
            }
            BulkPatch::RenameFamily { family_id, name } => {
                conn.execute(
                    "UPDATE nodes \
                     SET families = (SELECT COALESCE(json_group_array(json_object( \
                             'id', json_extract(f.value, '$.id'), \
                             'name', CASE WHEN json_extract(f.value, '$.id') = ?1 \
                                          THEN ?2 ELSE json_extract(f.value, '$.name') END)), '[]') \
                                     FROM json_each(nodes.families) AS f), \
                         modified_at = CURRENT_TIMESTAMP \
                     WHERE EXISTS (SELECT 1 FROM json_each(nodes.families) AS f \
                                   WHERE json_extract(f.value, '$.id') = ?1)",
                    params![family_id.as_str(), name.as_str()],
                )
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!(
                        "Failed to rename family references: {}",
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Delete a row and pull its id out of every other row's relation and
    /// `families` lists, in one transaction.
    ///
    /// Returns `false` (after rolling back) when the row did not exist.
    pub async fn db_delete_cascade(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        let deleted = match conn.execute("DELETE FROM nodes WHERE id = ?1", [id]).await {
            Ok(count) => count,
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::sql_execution(format!(
                    "Failed to delete node: {}",
                    e
                )));
            }
        };

        if deleted == 0 {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Ok(false);
        }

        let pull = "UPDATE nodes SET \
             parents = (SELECT COALESCE(json_group_array(json(p.value)), '[]') \
                        FROM json_each(nodes.parents) AS p \
                        WHERE json_extract(p.value, '$.id') <> ?1), \
             children = (SELECT COALESCE(json_group_array(json(c.value)), '[]') \
                         FROM json_each(nodes.children) AS c \
                         WHERE json_extract(c.value, '$.id') <> ?1), \
             spouses = (SELECT COALESCE(json_group_array(json(s.value)), '[]') \
                        FROM json_each(nodes.spouses) AS s \
                        WHERE json_extract(s.value, '$.id') <> ?1), \
             siblings = (SELECT COALESCE(json_group_array(json(sb.value)), '[]') \
                         FROM json_each(nodes.siblings) AS sb \
                         WHERE json_extract(sb.value, '$.id') <> ?1), \
             families = (SELECT COALESCE(json_group_array(json(f.value)), '[]') \
                         FROM json_each(nodes.families) AS f \
                         WHERE json_extract(f.value, '$.id') <> ?1), \
             modified_at = CURRENT_TIMESTAMP \
             WHERE EXISTS (SELECT 1 FROM json_each(nodes.parents) AS p \
                           WHERE json_extract(p.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.children) AS c \
                        WHERE json_extract(c.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.spouses) AS s \
                        WHERE json_extract(s.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.siblings) AS sb \
                        WHERE json_extract(sb.value, '$.id') = ?1) \
             OR EXISTS (SELECT 1 FROM json_each(nodes.families) AS f \
                        WHERE json_extract(f.value, '$.id') = ?1)";

        if let Err(e) = conn.execute(pull, [id]).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to pull node references: {}",
                e
            )));
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(true)
    }

    /// Run a query and collect every row's column values.
    ///
    /// libsql's local backend reads columns lazily against the statement
    /// cursor, so each row must be decoded into owned values before the
    /// cursor advances; a `Row` handle read after `next()` returns NULLs.
    async fn query_rows(
        &self,
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Vec<Value>>, DatabaseError> {
        let mut stmt = conn.prepare(sql).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to prepare query: {}", e))
        })?;
        let mut rows = stmt.query(params).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute query: {}", e))
        })?;

        let mut collected = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            collected.push(Self::row_values(&row)?);
        }
        Ok(collected)
    }

    /// Decode every column of the cursor's current row into owned values.
    fn row_values(row: &Row) -> Result<Vec<Value>, DatabaseError> {
        let count = row.column_count();
        let mut values = Vec::with_capacity(count as usize);
        for idx in 0..count {
            values.push(row.get_value(idx).map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to read column {}: {}", idx, e))
            })?);
        }
        Ok(values)
    }
}
