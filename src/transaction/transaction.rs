//! Transaction identities and page locking
//!
//! The storage core never inspects a [`TransactionId`]; it only threads it
//! through to the [`ConcurrencyControl`] collaborator and records it on pages
//! it dirties.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::page::PageId;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque transaction identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate a fresh, process-unique id
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Access intent for a page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// Lock Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<Permissions> for LockMode {
    fn from(perm: Permissions) -> Self {
        match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Page-level concurrency control consulted by the buffer pool
pub trait ConcurrencyControl: Send + Sync {
    /// Acquire a lock on `pid` matching `perm`, or fail with `LockConflict`
    fn acquire(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> Result<()>;

    /// Release whatever `tid` holds on `pid`
    fn release(&self, tid: TransactionId, pid: PageId);

    fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool;

    /// Release every lock held by `tid`
    fn release_all(&self, tid: TransactionId);
}

/// Grants every request and tracks nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocking;

impl ConcurrencyControl for NoLocking {
    fn acquire(&self, _tid: TransactionId, _pid: PageId, _perm: Permissions) -> Result<()> {
        Ok(())
    }

    fn release(&self, _tid: TransactionId, _pid: PageId) {}

    fn holds_lock(&self, _tid: TransactionId, _pid: PageId) -> bool {
        false
    }

    fn release_all(&self, _tid: TransactionId) {}
}

#[derive(Debug, Default)]
struct PageLock {
    exclusive: Option<TransactionId>,
    shared: HashSet<TransactionId>,
}

impl PageLock {
    fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }
}

/// Shared/exclusive page lock table.
///
/// Requests that conflict fail immediately with `LockConflict`; there is no
/// waiting and no deadlock detection.
#[derive(Debug, Default)]
pub struct PageLockTable {
    locks: Mutex<HashMap<PageId, PageLock>>,
}

impl PageLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode `tid` currently holds on `pid`
    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        let locks = self.locks.lock();
        let entry = locks.get(&pid)?;
        if entry.exclusive == Some(tid) {
            Some(LockMode::Exclusive)
        } else if entry.shared.contains(&tid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }
}

impl ConcurrencyControl for PageLockTable {
    fn acquire(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> Result<()> {
        let mut locks = self.locks.lock();
        let entry = locks.entry(pid).or_default();

        if let Some(holder) = entry.exclusive {
            // An exclusive holder implicitly holds the shared lock too
            if holder == tid {
                return Ok(());
            }
            return Err(Error::LockConflict { tid, pid });
        }

        match LockMode::from(perm) {
            LockMode::Shared => {
                entry.shared.insert(tid);
                Ok(())
            }
            LockMode::Exclusive => {
                let sole_reader = entry.shared.len() == 1 && entry.shared.contains(&tid);
                if !entry.shared.is_empty() && !sole_reader {
                    return Err(Error::LockConflict { tid, pid });
                }
                if sole_reader {
                    debug!(%tid, %pid, "upgrading shared lock");
                }
                entry.shared.clear();
                entry.exclusive = Some(tid);
                Ok(())
            }
        }
    }

    fn release(&self, tid: TransactionId, pid: PageId) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get_mut(&pid) {
            if entry.exclusive == Some(tid) {
                entry.exclusive = None;
            }
            entry.shared.remove(&tid);
            if entry.is_free() {
                locks.remove(&pid);
            }
        }
    }

    fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_mode(tid, pid).is_some()
    }

    fn release_all(&self, tid: TransactionId) {
        let mut locks = self.locks.lock();
        for entry in locks.values_mut() {
            if entry.exclusive == Some(tid) {
                entry.exclusive = None;
            }
            entry.shared.remove(&tid);
        }
        locks.retain(|_, entry| !entry.is_free());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_ids_are_unique() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let table = PageLockTable::new();
        let pid = PageId::new(1, 0);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        table.acquire(t1, pid, Permissions::ReadOnly).unwrap();
        table.acquire(t2, pid, Permissions::ReadOnly).unwrap();
        assert!(table.holds_lock(t1, pid));
        assert!(table.holds_lock(t2, pid));
        assert!(matches!(
            table.acquire(t1, pid, Permissions::ReadWrite),
            Err(Error::LockConflict { .. })
        ));
    }

    #[test]
    fn test_upgrade_sole_reader() {
        let table = PageLockTable::new();
        let pid = PageId::new(1, 0);
        let t1 = TransactionId::new();

        table.acquire(t1, pid, Permissions::ReadOnly).unwrap();
        table.acquire(t1, pid, Permissions::ReadWrite).unwrap();
        assert_eq!(table.lock_mode(t1, pid), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_exclusive_blocks_others() {
        let table = PageLockTable::new();
        let pid = PageId::new(1, 0);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        table.acquire(t1, pid, Permissions::ReadWrite).unwrap();
        assert!(table.acquire(t2, pid, Permissions::ReadOnly).is_err());

        table.release_all(t1);
        assert!(!table.holds_lock(t1, pid));
        table.acquire(t2, pid, Permissions::ReadWrite).unwrap();
    }

    #[test]
    fn test_release_single_page() {
        let table = PageLockTable::new();
        let (p0, p1) = (PageId::new(1, 0), PageId::new(1, 1));
        let t1 = TransactionId::new();

        table.acquire(t1, p0, Permissions::ReadOnly).unwrap();
        table.acquire(t1, p1, Permissions::ReadOnly).unwrap();
        table.release(t1, p0);
        assert!(!table.holds_lock(t1, p0));
        assert!(table.holds_lock(t1, p1));
    }

    #[test]
    fn test_no_locking_grants_everything() {
        let cc = NoLocking;
        let pid = PageId::new(1, 0);
        cc.acquire(TransactionId::new(), pid, Permissions::ReadWrite)
            .unwrap();
        cc.acquire(TransactionId::new(), pid, Permissions::ReadWrite)
            .unwrap();
    }
}
