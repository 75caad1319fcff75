//! HeapDB - a page-oriented relational storage and execution engine
//!
//! This library provides:
//! - A typed value model (field types, tuple descriptors, tuples)
//! - Heap file storage over fixed-size slotted pages
//! - A bounded buffer pool with pluggable eviction
//! - Pull-based query operators (scan, filter, hash join, aggregate,
//!   insert, delete)
//! - Histogram-based selectivity estimation

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod logging;
pub mod optimizer;
pub mod storage;
pub mod transaction;

pub use config::DbConfig;
pub use database::Database;
pub use error::{Error, Result};
