//! Service layer: the relation consistency engine and the tree query
//! engine, both operating through the `NodeStore` trait.

pub mod error;
pub mod family_service;
pub mod tree_service;

pub use error::FamilyServiceError;
pub use family_service::{FamilyService, RELATION_EVENT_CHANNEL_CAPACITY};
pub use tree_service::{
    ExpandFlags, FamiliesView, FamilyHead, RelativesView, RootView, TreeNode, TreeService, Viewer,
};
