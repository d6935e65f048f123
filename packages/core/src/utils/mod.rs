//! Shared utilities

pub mod strings;
