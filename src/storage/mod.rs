//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Fields and tuples
//! - Slotted heap pages
//! - Heap file storage
//! - Buffer pool and its eviction policies

pub mod buffer_pool;
pub mod eviction;
pub mod heap;
pub mod page;
pub mod tuple;

pub use buffer_pool::{BufferPool, PoolStats, StatsSnapshot};
pub use eviction::{EvictionKind, EvictionPolicy, LruPolicy, SweepPolicy};
pub use heap::{HeapFile, HeapFileIterator};
pub use page::{HeapPage, PageId, PageRef, RecordId, TableId, PAGE_SIZE};
pub use tuple::{Field, Tuple};
