//! Transaction module
//!
//! Transaction identities and the page-level concurrency-control collaborator
//! consulted by the buffer pool.

pub mod transaction;

pub use transaction::{
    ConcurrencyControl, LockMode, NoLocking, PageLockTable, Permissions, TransactionId,
};
