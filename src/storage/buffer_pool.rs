//! Buffer Pool for HeapDB
//!
//! The buffer pool caches pages in memory keyed by page identity. Misses are
//! read through the owning heap file; when the pool is full the configured
//! eviction policy picks victims, and every dirty victim is written back
//! before it leaves the cache.
//!
//! All cache mutations are serialized by one mutex. Page contents are guarded
//! separately by each page's own `RwLock`; the pool mutex may be held while
//! taking a page lock, never the other way round.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::storage::eviction::{EvictionKind, EvictionPolicy};
use crate::storage::heap::HeapFile;
use crate::storage::page::{HeapPage, PageId, PageRef, TableId};
use crate::storage::tuple::Tuple;
use crate::transaction::{ConcurrencyControl, NoLocking, Permissions, TransactionId};

/// Counters kept by the buffer pool. Updated lock-free.
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    pages_read: AtomicU64,
    pages_written: AtomicU64,
}

impl PoolStats {
    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub pages_read: u64,
    pub pages_written: u64,
}

impl StatsSnapshot {
    /// Fraction of fetches served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} evictions={} read={} written={} hit_rate={:.2}",
            self.hits,
            self.misses,
            self.evictions,
            self.pages_read,
            self.pages_written,
            self.hit_rate()
        )
    }
}

struct PoolState {
    cache: HashMap<PageId, PageRef>,
    policy: Box<dyn EvictionPolicy>,
}

/// Bounded page cache
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    state: Mutex<PoolState>,
    concurrency: Arc<dyn ConcurrencyControl>,
    stats: PoolStats,
}

impl BufferPool {
    /// Create a pool holding at most `capacity` pages, evicting LRU pages
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Self {
        Self {
            capacity,
            catalog,
            state: Mutex::new(PoolState {
                cache: HashMap::new(),
                policy: EvictionKind::Lru.build(),
            }),
            concurrency: Arc::new(NoLocking),
            stats: PoolStats::default(),
        }
    }

    /// Replace the eviction policy. Only meaningful on an empty pool.
    pub fn with_policy(self, policy: Box<dyn EvictionPolicy>) -> Self {
        {
            let mut state = self.state.lock();
            state.policy = policy;
            let cached: Vec<PageId> = state.cache.keys().copied().collect();
            for pid in cached {
                state.policy.record_access(pid);
            }
        }
        self
    }

    /// Replace the concurrency-control collaborator
    pub fn with_concurrency(mut self, concurrency: Arc<dyn ConcurrencyControl>) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of pages currently cached
    pub fn cached_pages(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.state.lock().cache.contains_key(&pid)
    }

    /// Fetch page `pid`, reading it from its heap file on a miss.
    ///
    /// The lock for `perm` is taken from the concurrency-control
    /// collaborator first. Fails with `BufferPoolFull` only if eviction
    /// cannot free a slot.
    pub fn get_page(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> Result<PageRef> {
        self.concurrency.acquire(tid, pid, perm)?;

        let mut state = self.state.lock();
        if let Some(page) = state.cache.get(&pid).cloned() {
            state.policy.record_access(pid);
            PoolStats::bump(&self.stats.hits);
            trace!(%pid, %tid, "buffer pool hit");
            return Ok(page);
        }

        PoolStats::bump(&self.stats.misses);
        if state.cache.len() >= self.capacity {
            self.evict(&mut state)?;
        }

        let file = self.catalog.database_file(pid.table_id)?;
        let page = Arc::new(RwLock::new(file.read_page(pid)?));
        PoolStats::bump(&self.stats.pages_read);

        state.cache.insert(pid, page.clone());
        state.policy.record_access(pid);
        Ok(page)
    }

    /// Insert `tuple` into table `table_id` on behalf of `tid`.
    ///
    /// Every page the insert touched is marked dirty and cached, so later
    /// fetches see the new tuple before any flush.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: Tuple) -> Result<()> {
        let file = self.catalog.database_file(table_id)?;
        let dirtied = file.insert_tuple(self, tid, tuple)?;
        self.cache_dirtied(tid, dirtied)
    }

    /// Delete `tuple` from the table its record id points into
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple.record_id().ok_or(Error::MissingRecordId)?;
        let file = self.catalog.database_file(rid.page_id.table_id)?;
        let dirtied = file.delete_tuple(self, tid, tuple)?;
        self.cache_dirtied(tid, dirtied)
    }

    /// Cache a page `file` is appending, writing it out under the pool
    /// lock. Any fetch that sees the grown file therefore hits this copy
    /// instead of reading a second one from disk.
    pub(crate) fn install_appended(
        &self,
        tid: TransactionId,
        file: &HeapFile,
        mut page: HeapPage,
    ) -> Result<PageRef> {
        let pid = page.id();
        self.concurrency.acquire(tid, pid, Permissions::ReadWrite)?;

        let mut state = self.state.lock();
        if state.cache.len() >= self.capacity {
            self.evict(&mut state)?;
        }
        file.write_page(&page)?;
        PoolStats::bump(&self.stats.pages_written);

        page.mark_dirty(true, Some(tid));
        let page = Arc::new(RwLock::new(page));
        state.cache.insert(pid, page.clone());
        state.policy.record_access(pid);
        Ok(page)
    }

    fn cache_dirtied(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<()> {
        for page in pages {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(true, Some(tid));
                guard.id()
            };

            let mut state = self.state.lock();
            let same_copy = state.cache.get(&pid).map(|cached| Arc::ptr_eq(cached, &page));
            match same_copy {
                Some(true) => {}
                // Reloaded by another fetch since we modified it; the cached
                // copy is what every other holder sees
                Some(false) => {
                    warn!(%pid, %tid, "page reloaded during modification, keeping cached copy")
                }
                None => {
                    if state.cache.len() >= self.capacity {
                        self.evict(&mut state)?;
                    }
                    state.cache.insert(pid, page);
                }
            }
            state.policy.record_access(pid);
        }
        Ok(())
    }

    /// Write page `pid` back if it is dirty
    pub fn flush_page(&self, pid: PageId) -> Result<()> {
        let page = self
            .state
            .lock()
            .cache
            .get(&pid)
            .cloned()
            .ok_or(Error::PageNotCached(pid))?;
        self.write_back(&page)
    }

    /// Write back every cached page.
    ///
    /// Meant for checkpoints and shutdown; regular operation flushes through
    /// eviction and transaction completion.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<PageRef> = self.state.lock().cache.values().cloned().collect();
        for page in &pages {
            self.write_back(page)?;
        }
        debug!(pages = pages.len(), "flushed all pages");
        Ok(())
    }

    /// Write back every page dirtied by `tid`
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for page in self.pages_dirtied_by(tid) {
            self.write_back(&page)?;
        }
        Ok(())
    }

    /// Drop `pid` from the cache without writing it back
    pub fn discard_page(&self, pid: PageId) {
        let mut state = self.state.lock();
        if state.cache.remove(&pid).is_some() {
            state.policy.remove(pid);
            debug!(%pid, "discarded page");
        }
    }

    /// Release `tid`'s lock on `pid` before the transaction ends
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.concurrency.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.concurrency.holds_lock(tid, pid)
    }

    /// Finish `tid`: on commit its dirty pages are written back, on abort
    /// they are discarded. Its locks are released either way.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let result = if commit {
            self.flush_pages(tid)
        } else {
            for page in self.pages_dirtied_by(tid) {
                let pid = page.read().id();
                self.discard_page(pid);
            }
            Ok(())
        };
        self.concurrency.release_all(tid);
        debug!(%tid, commit, "transaction complete");
        result
    }

    fn pages_dirtied_by(&self, tid: TransactionId) -> Vec<PageRef> {
        let pages: Vec<PageRef> = self.state.lock().cache.values().cloned().collect();
        pages
            .into_iter()
            .filter(|page| page.read().is_dirty() == Some(tid))
            .collect()
    }

    fn write_back(&self, page: &PageRef) -> Result<()> {
        let mut guard = page.write();
        if guard.is_dirty().is_none() {
            return Ok(());
        }
        let file = self.catalog.database_file(guard.id().table_id)?;
        file.write_page(&guard)?;
        guard.mark_dirty(false, None);
        PoolStats::bump(&self.stats.pages_written);
        debug!(pid = %guard.id(), "flushed page");
        Ok(())
    }

    /// Remove the policy's victims, writing back dirty ones first
    fn evict(&self, state: &mut PoolState) -> Result<()> {
        let victims = state.policy.victims();
        for pid in victims {
            if let Some(page) = state.cache.get(&pid).cloned() {
                self.write_back(&page)?;
            }
            state.cache.remove(&pid);
            state.policy.remove(pid);
            PoolStats::bump(&self.stats.evictions);
            debug!(%pid, policy = state.policy.name(), "evicted page");
        }

        if state.cache.len() >= self.capacity {
            return Err(Error::BufferPoolFull(self.capacity));
        }
        Ok(())
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::schema::TupleDesc;
    use crate::catalog::types::Type;
    use crate::storage::eviction::SweepPolicy;
    use crate::storage::tuple::Field;
    use crate::transaction::PageLockTable;
    use tempfile::tempdir;

    fn setup(dir: &std::path::Path, pages: u32, capacity: usize) -> (Arc<HeapFile>, BufferPool) {
        let desc = TupleDesc::named(vec![(Type::Int, "v")]).unwrap();
        let file = Arc::new(HeapFile::create(dir.join("t.dat"), desc).unwrap());
        for n in 0..pages {
            let page = HeapPage::empty(PageId::new(file.id(), n), file.tuple_desc().clone());
            file.write_page(&page).unwrap();
        }
        let catalog = Arc::new(Catalog::new());
        catalog.add_table(file.clone(), "t", None);
        (file, BufferPool::new(capacity, catalog))
    }

    fn row(file: &HeapFile, v: i32) -> Tuple {
        Tuple::from_fields(file.tuple_desc().clone(), vec![Field::Int(v)]).unwrap()
    }

    #[test]
    fn test_hit_returns_same_page() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let tid = TransactionId::new();
        let pid = PageId::new(file.id(), 0);

        let a = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        let b = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let stats = pool.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_lru_evicts_one_page() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 3, 2);
        let tid = TransactionId::new();
        let pid = |n| PageId::new(file.id(), n);

        pool.get_page(tid, pid(0), Permissions::ReadOnly).unwrap();
        pool.get_page(tid, pid(1), Permissions::ReadOnly).unwrap();
        pool.get_page(tid, pid(0), Permissions::ReadOnly).unwrap();
        pool.get_page(tid, pid(2), Permissions::ReadOnly).unwrap();

        assert!(pool.is_cached(pid(0)));
        assert!(!pool.is_cached(pid(1)));
        assert!(pool.is_cached(pid(2)));
        assert_eq!(pool.stats().evictions, 1);
    }

    #[test]
    fn test_sweep_evicts_everything() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 3, 2);
        let pool = pool.with_policy(Box::new(SweepPolicy::new()));
        let tid = TransactionId::new();
        let pid = |n| PageId::new(file.id(), n);

        pool.get_page(tid, pid(0), Permissions::ReadOnly).unwrap();
        pool.get_page(tid, pid(1), Permissions::ReadOnly).unwrap();
        pool.get_page(tid, pid(2), Permissions::ReadOnly).unwrap();

        assert_eq!(pool.cached_pages(), 1);
        assert!(pool.is_cached(pid(2)));
        assert_eq!(pool.stats().evictions, 2);
    }

    #[test]
    fn test_eviction_flushes_dirty_page() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 2, 1);
        let tid = TransactionId::new();

        pool.insert_tuple(tid, file.id(), row(&file, 99)).unwrap();
        let first = PageId::new(file.id(), 0);
        assert!(pool.is_cached(first));

        // Fetching page 1 forces page 0 out; it must reach disk first
        pool.get_page(tid, PageId::new(file.id(), 1), Permissions::ReadOnly)
            .unwrap();
        assert!(!pool.is_cached(first));

        let on_disk = file.read_page(first).unwrap();
        let values: Vec<_> = on_disk.tuples().map(|t| t.field(0).unwrap().clone()).collect();
        assert_eq!(values, vec![Field::Int(99)]);
    }

    #[test]
    fn test_appended_page_cached_before_visible() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 0, 4);
        let tid = TransactionId::new();

        let appended = file.insert_tuple(&pool, tid, row(&file, 3)).unwrap();
        let pid = PageId::new(file.id(), 0);
        assert!(pool.is_cached(pid));

        let fetched = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        assert!(Arc::ptr_eq(&appended[0], &fetched));
        assert_eq!(fetched.read().is_dirty(), Some(tid));
        assert_eq!(pool.stats().misses, 0);
    }

    #[test]
    fn test_flush_page_not_cached() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 2);
        assert!(matches!(
            pool.flush_page(PageId::new(file.id(), 0)),
            Err(Error::PageNotCached(_))
        ));
    }

    #[test]
    fn test_discard_drops_changes() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 2);
        let tid = TransactionId::new();
        let pid = PageId::new(file.id(), 0);

        pool.insert_tuple(tid, file.id(), row(&file, 5)).unwrap();
        pool.discard_page(pid);
        assert!(!pool.is_cached(pid));

        let page = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().tuples().count(), 0);
    }

    #[test]
    fn test_transaction_commit_and_abort() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let pid = PageId::new(file.id(), 0);

        let t1 = TransactionId::new();
        pool.insert_tuple(t1, file.id(), row(&file, 1)).unwrap();
        pool.transaction_complete(t1, true).unwrap();
        assert!(pool.is_cached(pid));
        assert_eq!(file.read_page(pid).unwrap().tuples().count(), 1);

        let t2 = TransactionId::new();
        pool.insert_tuple(t2, file.id(), row(&file, 2)).unwrap();
        pool.transaction_complete(t2, false).unwrap();
        assert!(!pool.is_cached(pid));

        let page = pool.get_page(t2, pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().tuples().count(), 1);
    }

    #[test]
    fn test_lock_conflicts_surface() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let pool = pool.with_concurrency(Arc::new(PageLockTable::new()));
        let pid = PageId::new(file.id(), 0);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        pool.get_page(t1, pid, Permissions::ReadWrite).unwrap();
        assert!(pool.holds_lock(t1, pid));
        assert!(matches!(
            pool.get_page(t2, pid, Permissions::ReadOnly),
            Err(Error::LockConflict { .. })
        ));

        pool.transaction_complete(t1, true).unwrap();
        assert!(!pool.holds_lock(t1, pid));
        pool.get_page(t2, pid, Permissions::ReadOnly).unwrap();
        pool.release_page(t2, pid);
        assert!(!pool.holds_lock(t2, pid));
    }
}
