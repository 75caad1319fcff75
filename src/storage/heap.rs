//! Heap File storage for HeapDB
//!
//! A heap file is an unordered, append-only sequence of fixed-size pages
//! backing one table. Tuples live in page slots; the file has no header and
//! carries no schema (the catalog supplies it).

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::schema::TupleDesc;
use crate::error::{Error, Result};
use crate::storage::buffer_pool::BufferPool;
use crate::storage::page::{HeapPage, PageId, PageRef, TableId, PAGE_SIZE};
use crate::storage::tuple::Tuple;
use crate::transaction::{Permissions, TransactionId};

/// Table identity derived from a file path
pub fn table_id_for(path: &Path) -> TableId {
    crc32fast::hash(path.to_string_lossy().as_bytes())
}

/// A table file
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    desc: Arc<TupleDesc>,
    table_id: TableId,
    /// Serializes page appends so two inserts never create the same page
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Open the heap file at `path`, creating an empty one if missing
    pub fn create(path: impl AsRef<Path>, desc: TupleDesc) -> Result<Self> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Self::open(path, desc)
    }

    /// Open an existing heap file
    pub fn open(path: impl AsRef<Path>, desc: TupleDesc) -> Result<Self> {
        let path = path.as_ref().canonicalize()?;
        if !path.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }
        let table_id = table_id_for(&path);
        Ok(Self {
            path,
            desc: Arc::new(desc),
            table_id,
            append_lock: Mutex::new(()),
        })
    }

    /// Unique id of this table
    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Number of whole pages in the file, from its current length
    pub fn num_pages(&self) -> Result<u32> {
        let len = std::fs::metadata(&self.path)?.len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    /// Read page `pid` from disk.
    ///
    /// A trailing partial page is zero padded. Pages starting at or beyond
    /// the end of the file are never synthesized.
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage> {
        if pid.table_id != self.table_id {
            return Err(Error::InvalidArgument(format!(
                "{} does not belong to table {}",
                pid, self.table_id
            )));
        }

        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let offset = pid.offset();
        if offset >= len {
            return Err(Error::PageOutOfRange(pid));
        }

        let mut data = vec![0u8; PAGE_SIZE];
        let available = std::cmp::min(PAGE_SIZE as u64, len - offset) as usize;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut data[..available])?;

        debug!(%pid, "read page");
        HeapPage::new(pid, &data, self.desc.clone())
    }

    /// Write `page` at its offset, growing the file if needed
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let data = page.page_data()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.seek(SeekFrom::Start(page.id().offset()))?;
        file.write_all(&data)?;
        file.flush()?;

        debug!(pid = %page.id(), "wrote page");
        Ok(())
    }

    /// Insert `tuple` into the lowest-numbered page with a free slot,
    /// appending a new page when every existing page is full.
    ///
    /// Returns the page that was modified.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageRef>> {
        let mut pending = Some(tuple);
        let scanned = self.num_pages()?;
        if let Some(page) = self.insert_into_existing(pool, tid, 0..scanned, &mut pending)? {
            return Ok(vec![page]);
        }

        let _append = self.append_lock.lock();
        // Pages appended by other inserts while we scanned may still have room
        let page_no = self.num_pages()?;
        if let Some(page) = self.insert_into_existing(pool, tid, scanned..page_no, &mut pending)? {
            return Ok(vec![page]);
        }

        let tuple = pending
            .take()
            .ok_or_else(|| Error::IllegalState("tuple was already placed".to_string()))?;
        let mut page = HeapPage::empty(PageId::new(self.table_id, page_no), self.desc.clone());
        page.insert_tuple(tuple)?;
        let page = pool.install_appended(tid, self, page)?;

        debug!(table = self.table_id, page_no, "appended page");
        Ok(vec![page])
    }

    fn insert_into_existing(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        pages: Range<u32>,
        pending: &mut Option<Tuple>,
    ) -> Result<Option<PageRef>> {
        for page_no in pages {
            let pid = PageId::new(self.table_id, page_no);
            let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            let mut guard = page.write();
            if guard.num_empty_slots() == 0 {
                continue;
            }
            if let Some(tuple) = pending.take() {
                guard.insert_tuple(tuple)?;
            }
            drop(guard);
            return Ok(Some(page));
        }
        Ok(None)
    }

    /// Free the slot `tuple` occupies. Returns the page that was modified.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let rid = tuple.record_id().ok_or(Error::MissingRecordId)?;
        if rid.page_id.table_id != self.table_id {
            return Err(Error::InvalidArgument(format!(
                "{} does not belong to table {}",
                rid, self.table_id
            )));
        }

        let page = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Iterator over every tuple in this file, read through `pool`
    pub fn iter(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator::new(self.clone(), pool, tid)
    }
}

#[derive(Debug)]
struct ScanState {
    next_page: u32,
    buffered: VecDeque<Tuple>,
}

/// Page-by-page iterator over a heap file.
///
/// Tuples are snapshot copies, so they remain valid after their page is
/// evicted. The page count is re-read whenever the iterator crosses a page
/// boundary, so pages appended mid-scan are seen.
#[derive(Debug)]
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    state: Option<ScanState>,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            state: None,
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.state = Some(ScanState {
            next_page: 0,
            buffered: VecDeque::new(),
        });
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn has_next(&mut self) -> Result<bool> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| Error::IllegalState("heap file iterator is not open".to_string()))?;

        while state.buffered.is_empty() {
            if state.next_page >= self.file.num_pages()? {
                return Ok(false);
            }
            let pid = PageId::new(self.file.id(), state.next_page);
            let page = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
            state.buffered.extend(page.read().tuples().cloned());
            state.next_page += 1;
        }
        Ok(true)
    }

    /// Next tuple, or `None` once every page has been read
    pub fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self
            .state
            .as_mut()
            .and_then(|state| state.buffered.pop_front()))
    }

    pub fn rewind(&mut self) -> Result<()> {
        if self.state.is_none() {
            return Err(Error::IllegalState(
                "cannot rewind a heap file iterator that is not open".to_string(),
            ));
        }
        self.open()
    }

    pub fn close(&mut self) {
        self.state = None;
    }
}
