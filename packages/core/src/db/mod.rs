//! Database layer for the family graph.
//!
//! `DatabaseService` owns the embedded libsql database and the raw SQL;
//! `TursoStore` adapts it to the `NodeStore` trait the services consume.

pub mod database;
pub mod error;
pub mod events;
pub mod node_store;
pub mod turso_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::{ChangeAction, RelationChange};
pub use node_store::{BulkPatch, NodeStore};
pub use turso_store::TursoStore;
