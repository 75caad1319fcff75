//! Database context
//!
//! Bundles the configuration, catalog and buffer pool that operators and
//! storage calls need. There is no process-wide instance; callers build one
//! and hand it (or clones of it) to whatever needs it.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::catalog::schema::TupleDesc;
use crate::catalog::Catalog;
use crate::config::DbConfig;
use crate::error::Result;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::heap::HeapFile;
use crate::storage::page::TableId;
use crate::transaction::{ConcurrencyControl, TransactionId};

/// Engine context: config + catalog + buffer pool
#[derive(Debug, Clone)]
pub struct Database {
    config: Arc<DbConfig>,
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    /// Build a context from `config`
    pub fn new(config: DbConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::new(config.buffer_pool_pages, catalog.clone())
            .with_policy(config.eviction.build());

        info!(
            pool_pages = config.buffer_pool_pages,
            eviction = ?config.eviction,
            "database context created"
        );
        Ok(Self {
            config: Arc::new(config),
            catalog,
            buffer_pool: Arc::new(buffer_pool),
        })
    }

    /// Build a context whose buffer pool consults `concurrency` for locks
    pub fn with_concurrency(
        config: DbConfig,
        concurrency: Arc<dyn ConcurrencyControl>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::new(config.buffer_pool_pages, catalog.clone())
            .with_policy(config.eviction.build())
            .with_concurrency(concurrency);
        Ok(Self {
            config: Arc::new(config),
            catalog,
            buffer_pool: Arc::new(buffer_pool),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Create (or open) the heap file at `path` and register it as `name`
    pub fn create_table(
        &self,
        path: impl AsRef<Path>,
        desc: TupleDesc,
        name: &str,
    ) -> Result<TableId> {
        let file = Arc::new(HeapFile::create(path, desc)?);
        let id = file.id();
        self.catalog.add_table(file, name, None);
        Ok(id)
    }

    /// Start a transaction
    pub fn begin(&self) -> TransactionId {
        TransactionId::new()
    }

    /// Flush `tid`'s pages and release its locks
    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, true)
    }

    /// Discard `tid`'s cached changes and release its locks
    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::Type;
    use crate::error::Error;
    use tempfile::tempdir;

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = Database::new(DbConfig::new().buffer_pool_pages(0));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_create_table_registers() {
        let dir = tempdir().unwrap();
        let db = Database::new(DbConfig::new().buffer_pool_pages(4)).unwrap();
        let desc = TupleDesc::named(vec![(Type::Int, "id")]).unwrap();

        let id = db.create_table(dir.path().join("t.dat"), desc, "t").unwrap();
        assert_eq!(db.catalog().table_id("t").unwrap(), id);
        assert_eq!(db.buffer_pool().capacity(), 4);
    }

    #[test]
    fn test_begin_gives_distinct_ids() {
        let db = Database::new(DbConfig::new()).unwrap();
        assert_ne!(db.begin(), db.begin());
    }
}
