//! System Catalog for HeapDB
//!
//! This module maps table ids and names to the heap files backing them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::schema::TupleDesc;
use crate::error::{Error, Result};
use crate::storage::heap::HeapFile;
use crate::storage::page::TableId;

/// A registered table
#[derive(Debug)]
pub struct TableEntry {
    pub name: String,
    pub file: Arc<HeapFile>,
    pub primary_key: Option<String>,
}

#[derive(Debug, Default)]
struct CatalogInner {
    tables: HashMap<TableId, Arc<TableEntry>>,
    names: HashMap<String, TableId>,
}

/// System Catalog - the table registry
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` under `name`.
    ///
    /// A table already using the same name or the same id is replaced.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str, primary_key: Option<String>) {
        let mut inner = self.inner.write();
        let id = file.id();

        if let Some(old_id) = inner.names.remove(name) {
            inner.tables.remove(&old_id);
        }
        if let Some(old) = inner.tables.remove(&id) {
            inner.names.remove(&old.name);
        }

        info!(table = name, id, path = %file.path().display(), "registered table");
        inner.names.insert(name.to_string(), id);
        inner.tables.insert(
            id,
            Arc::new(TableEntry {
                name: name.to_string(),
                file,
                primary_key,
            }),
        );
    }

    fn entry(&self, id: TableId) -> Result<Arc<TableEntry>> {
        self.inner
            .read()
            .tables
            .get(&id)
            .cloned()
            .ok_or(Error::TableNotFound(id))
    }

    /// Id of the table called `name`
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| Error::TableNameNotFound(name.to_string()))
    }

    /// Heap file backing table `id`
    pub fn database_file(&self, id: TableId) -> Result<Arc<HeapFile>> {
        Ok(self.entry(id)?.file.clone())
    }

    pub fn tuple_desc(&self, id: TableId) -> Result<Arc<TupleDesc>> {
        Ok(self.entry(id)?.file.tuple_desc().clone())
    }

    pub fn table_name(&self, id: TableId) -> Result<String> {
        Ok(self.entry(id)?.name.clone())
    }

    pub fn primary_key(&self, id: TableId) -> Result<Option<String>> {
        Ok(self.entry(id)?.primary_key.clone())
    }

    /// Ids of every registered table
    pub fn table_ids(&self) -> Vec<TableId> {
        self.inner.read().tables.keys().copied().collect()
    }

    /// Remove every table
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tables.clear();
        inner.names.clear();
    }
}
