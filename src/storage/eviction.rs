//! Eviction policies for the buffer pool.
//!
//! A policy only chooses victims. Flushing dirty victims before dropping them
//! is the buffer pool's job and happens the same way for every policy.
//!
//! Implements:
//! - [`SweepPolicy`] - evict every cached page at once
//! - [`LruPolicy`] - evict the single least recently used page

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::storage::page::PageId;

/// Victim selection for the buffer pool
pub trait EvictionPolicy: Send {
    /// Record that `pid` was fetched or (re)inserted into the cache.
    fn record_access(&mut self, pid: PageId);

    /// Forget `pid` (evicted or discarded).
    fn remove(&mut self, pid: PageId);

    /// Pages to evict next, in eviction order. Empty when nothing is cached.
    fn victims(&self) -> Vec<PageId>;

    fn name(&self) -> &'static str;
}

/// Which policy a buffer pool is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionKind {
    Sweep,
    Lru,
}

impl EvictionKind {
    pub fn build(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionKind::Sweep => Box::new(SweepPolicy::new()),
            EvictionKind::Lru => Box::new(LruPolicy::new()),
        }
    }
}

/// Evicts the whole cache whenever room is needed.
#[derive(Debug, Default)]
pub struct SweepPolicy {
    resident: IndexSet<PageId>,
}

impl SweepPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for SweepPolicy {
    fn record_access(&mut self, pid: PageId) {
        self.resident.insert(pid);
    }

    fn remove(&mut self, pid: PageId) {
        self.resident.shift_remove(&pid);
    }

    fn victims(&self) -> Vec<PageId> {
        self.resident.iter().copied().collect()
    }

    fn name(&self) -> &'static str {
        "sweep"
    }
}

/// Evicts the least recently used page.
///
/// Recency order is kept in an `IndexSet`: the front is the oldest access.
#[derive(Debug, Default)]
pub struct LruPolicy {
    order: IndexSet<PageId>,
}

impl LruPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for LruPolicy {
    fn record_access(&mut self, pid: PageId) {
        self.order.shift_remove(&pid);
        self.order.insert(pid);
    }

    fn remove(&mut self, pid: PageId) {
        self.order.shift_remove(&pid);
    }

    fn victims(&self) -> Vec<PageId> {
        self.order.first().copied().into_iter().collect()
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}
