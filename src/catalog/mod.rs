//! Catalog module
//!
//! This module contains the table registry, tuple descriptors, and field types.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::{Catalog, TableEntry};
pub use schema::{TdItem, TupleDesc};
pub use types::Type;
