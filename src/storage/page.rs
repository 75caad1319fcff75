//! Page management for HeapDB
//!
//! This module defines the slotted heap page used for disk-based storage.
//! Each page is a fixed-size block (4KB) laid out as an occupancy bitmap
//! followed by a flat array of fixed-width tuple slots. Slot `i` is occupied
//! when `header[i / 8] & (1 << (i % 8))` is set.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::catalog::schema::TupleDesc;
use crate::error::{Error, Result};
use crate::storage::tuple::Tuple;
use crate::transaction::TransactionId;

pub use crate::config::PAGE_SIZE;

/// Table identifier
pub type TableId = u32;

/// Identity of a page: (table, zero-based page number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }

    /// Byte offset of this page within its table file
    pub fn offset(&self) -> u64 {
        self.page_no as u64 * PAGE_SIZE as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page({}, {})", self.table_id, self.page_no)
    }
}

/// Storage location of a tuple: a page and a slot within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// Shared handle to a cached page. Holders mutate pages in place.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Number of tuple slots a page holds for tuples of `tuple_size` bytes
pub fn slots_per_page(tuple_size: usize) -> usize {
    (PAGE_SIZE * 8) / (tuple_size * 8 + 1)
}

/// Bytes of occupancy bitmap for `num_slots` slots
pub fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// A slotted heap page
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Decode a page from its on-disk image
    pub fn new(pid: PageId, data: &[u8], desc: Arc<TupleDesc>) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(Error::Corrupted(format!(
                "{} has {} bytes, expected {}",
                pid,
                data.len(),
                PAGE_SIZE
            )));
        }

        let num_slots = slots_per_page(desc.size());
        let header_len = header_size(num_slots);
        let header = data[..header_len].to_vec();
        let tuple_size = desc.size();

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                tuples.push(None);
                continue;
            }
            let start = header_len + slot * tuple_size;
            let mut cursor = Cursor::new(&data[start..start + tuple_size]);
            let mut tuple = Tuple::parse(desc.clone(), &mut cursor)?;
            tuple.set_record_id(Some(RecordId::new(pid, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            pid,
            desc,
            header,
            tuples,
            dirtied_by: None,
        })
    }

    /// A page with every slot free
    pub fn empty(pid: PageId, desc: Arc<TupleDesc>) -> Self {
        let num_slots = slots_per_page(desc.size());
        Self {
            pid,
            desc,
            header: vec![0u8; header_size(num_slots)],
            tuples: vec![None; num_slots],
            dirtied_by: None,
        }
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Encode this page into its fixed-size on-disk image
    pub fn page_data(&self) -> Result<Vec<u8>> {
        let tuple_size = self.desc.size();
        let mut data = Vec::with_capacity(PAGE_SIZE);
        data.extend_from_slice(&self.header);

        for slot in &self.tuples {
            match slot {
                Some(tuple) => tuple.serialize(&mut data)?,
                None => data.resize(data.len() + tuple_size, 0),
            }
        }

        data.resize(PAGE_SIZE, 0);
        Ok(data)
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    /// Place `tuple` in the lowest free slot and return its new location.
    ///
    /// Every field must be set; a page holding a partial tuple could never
    /// be written back.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId> {
        if **tuple.tuple_desc() != *self.desc {
            return Err(Error::SchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.tuple_desc().to_string(),
            });
        }
        if let Some(unset) = tuple.fields().iter().position(Option::is_none) {
            return Err(Error::InvalidArgument(format!(
                "cannot store tuple with unset field {}",
                unset
            )));
        }

        let slot = (0..self.num_slots())
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(Error::PageFull(self.pid))?;

        let rid = RecordId::new(self.pid, slot);
        tuple.reset_desc(self.desc.clone())?;
        tuple.set_record_id(Some(rid));
        self.mark_slot_used(slot, true);
        self.tuples[slot] = Some(tuple);
        Ok(rid)
    }

    /// Free the slot `tuple` was read from
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let rid = tuple.record_id().ok_or(Error::MissingRecordId)?;
        if rid.page_id != self.pid {
            return Err(Error::InvalidArgument(format!(
                "tuple at {} does not live on {}",
                rid, self.pid
            )));
        }
        if !self.is_slot_used(rid.slot) {
            return Err(Error::SlotEmpty(rid));
        }

        self.mark_slot_used(rid.slot, false);
        self.tuples[rid.slot] = None;
        Ok(())
    }

    /// Occupied tuples in slot order
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    /// Record (or clear) the transaction that last dirtied this page
    pub fn mark_dirty(&mut self, dirty: bool, tid: Option<TransactionId>) {
        self.dirtied_by = if dirty { tid } else { None };
    }

    /// Transaction that dirtied this page, if it is dirty
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }
}
