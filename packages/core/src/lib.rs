//! # Kinship Core
//!
//! Family-tree graph engine: person nodes connected by typed, symmetric
//! relations (parent/child, spouse, sibling) grouped into families, with
//! tree-shaped read queries and privacy redaction for anonymous viewers.
//!
//! ## Architecture
//!
//! - [`models`] - the `Node` arena entry, typed relation edges, derived
//!   `families` entries, and per-operation input structs.
//! - [`db`] - the embedded libsql database, the `NodeStore` trait, and the
//!   `RelationChange` notification contract. Multi-document writes are
//!   transactional; a reciprocal edge is never observable half-written.
//! - [`services`] - `FamilyService` (mutations, invariant enforcement,
//!   change broadcasting) and `TreeService` (household views, relative
//!   lists, root directory, redaction).
//!
//! ## Example
//!
//! ```no_run
//! use kinship_core::db::TursoStore;
//! use kinship_core::models::{Gender, PersonInput, PersonName};
//! use kinship_core::services::FamilyService;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TursoStore::new("family.db".into()).await?);
//! let service = FamilyService::new(store);
//!
//! let node = service
//!     .create_node(PersonInput {
//!         name: PersonName {
//!             first: "amara".to_string(),
//!             middle: None,
//!             last: None,
//!             nicknames: Vec::new(),
//!         },
//!         gender: Gender::Female,
//!         birth: None,
//!     })
//!     .await?;
//! println!("created {}", node.id);
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use db::{BulkPatch, ChangeAction, DatabaseService, NodeStore, RelationChange, TursoStore};
pub use models::{Gender, Node, NodeFamily, NodeRelation, RelativeKind};
pub use services::{FamilyService, FamilyServiceError, TreeService, Viewer};
