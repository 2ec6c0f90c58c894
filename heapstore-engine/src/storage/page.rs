//! Page identifiers and the slotted heap page
//!
//! A heap page is a fixed-size byte image made of an occupancy bitmap followed
//! by an array of fixed-width tuple slots:
//!
//! ```text
//! [ bitmap: header_len bytes ][ slot 0 ][ slot 1 ] ... [ slot n-1 ][ padding ]
//! ```
//!
//! - `slots = floor(page_size * 8 / (tuple_size * 8 + 1))`
//! - `header_len = ceil(slots / 8)`
//! - bit `i` is bit `i % 8` (LSB first) of byte `i / 8`; set = occupied
//!
//! An all-zero image is a valid empty page.

use std::sync::Arc;

use super::schema::Schema;
use super::tuple::Tuple;
use crate::error::{HeapError, HeapResult};
use crate::transaction::TransactionId;

/// Identifier of a heap file (table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u64);

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identifier of a page: owning table plus page number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: u32) -> Self {
        PageId {
            table_id,
            page_number,
        }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table {} page {}", self.table_id, self.page_number)
    }
}

/// Physical address of a tuple (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        RecordId { page_id, slot }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id.page_number, self.slot)
    }
}

/// Slot geometry of a page for a given tuple width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub page_size: usize,
    pub tuple_size: usize,
    pub slots: usize,
    pub header_len: usize,
}

impl PageLayout {
    /// Compute the layout, failing if not even one tuple fits or if slot
    /// numbers would not fit a `u16`
    pub fn new(page_size: usize, tuple_size: usize) -> HeapResult<Self> {
        let slots = (page_size * 8) / (tuple_size * 8 + 1);
        if slots == 0 {
            return Err(HeapError::PageTooSmall {
                page_size,
                tuple_size,
            });
        }
        if slots > u16::MAX as usize {
            return Err(HeapError::TooManySlots {
                page_size,
                tuple_size,
                slots,
            });
        }
        Ok(PageLayout {
            page_size,
            tuple_size,
            slots,
            header_len: slots.div_ceil(8),
        })
    }

    pub fn for_schema(page_size: usize, schema: &Schema) -> HeapResult<Self> {
        Self::new(page_size, schema.byte_size())
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.header_len + slot * self.tuple_size;
        start..start + self.tuple_size
    }
}

/// A heap page holding fixed-width tuples of one schema
#[derive(Clone)]
pub struct HeapPage {
    id: PageId,
    schema: Arc<Schema>,
    layout: PageLayout,
    data: Vec<u8>,
    before_image: Vec<u8>,
    dirty: Option<TransactionId>,
}

impl HeapPage {
    /// Build a page from its on-disk image; the page size is the image length
    pub fn from_bytes(id: PageId, schema: Arc<Schema>, data: Vec<u8>) -> HeapResult<Self> {
        let layout = PageLayout::for_schema(data.len(), &schema)?;
        Ok(HeapPage {
            id,
            schema,
            layout,
            before_image: data.clone(),
            data,
            dirty: None,
        })
    }

    /// Create an empty page of the given size
    pub fn empty(id: PageId, schema: Arc<Schema>, page_size: usize) -> HeapResult<Self> {
        Self::from_bytes(id, schema, Self::empty_page_data(page_size))
    }

    /// Image of an empty page
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.layout.slots
    }

    /// Raw page image
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_slot_used(&self, slot: u16) -> bool {
        let slot = slot as usize;
        slot < self.layout.slots && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: u16, used: bool) {
        let slot = slot as usize;
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    pub fn occupied_count(&self) -> usize {
        (0..self.layout.slots as u16)
            .filter(|s| self.is_slot_used(*s))
            .count()
    }

    pub fn free_slot_count(&self) -> usize {
        self.layout.slots - self.occupied_count()
    }

    /// Lowest free slot, if any
    pub fn first_free_slot(&self) -> Option<u16> {
        (0..self.layout.slots as u16).find(|s| !self.is_slot_used(*s))
    }

    fn check_slot(&self, slot: u16) -> HeapResult<()> {
        if slot as usize >= self.layout.slots {
            return Err(HeapError::IndexOutOfRange {
                index: slot as usize,
                count: self.layout.slots,
            });
        }
        Ok(())
    }

    /// Decode the tuple in an occupied slot
    pub fn read_slot(&self, slot: u16) -> HeapResult<Tuple> {
        self.check_slot(slot)?;
        if !self.is_slot_used(slot) {
            return Err(HeapError::SlotEmpty {
                page_id: self.id,
                slot,
            });
        }
        let mut tuple = Tuple::decode(&self.schema, &self.data[self.layout.slot_range(slot as usize)])
            .map_err(|reason| HeapError::CorruptPage {
                page_id: self.id,
                reason: format!("slot {slot}: {reason}"),
            })?;
        tuple.set_record_id(Some(RecordId::new(self.id, slot)));
        Ok(tuple)
    }

    /// Write a tuple into a slot and mark it occupied
    pub fn write_slot(&mut self, slot: u16, tuple: &Tuple) -> HeapResult<()> {
        self.check_slot(slot)?;
        if **tuple.schema() != *self.schema {
            return Err(HeapError::SchemaMismatch {
                expected: self.schema.describe(),
                actual: tuple.schema().describe(),
            });
        }
        let range = self.layout.slot_range(slot as usize);
        self.data[range].copy_from_slice(&tuple.to_bytes());
        self.set_slot_used(slot, true);
        Ok(())
    }

    /// Zero a slot and mark it free
    pub fn clear_slot(&mut self, slot: u16) -> HeapResult<()> {
        self.check_slot(slot)?;
        if !self.is_slot_used(slot) {
            return Err(HeapError::SlotEmpty {
                page_id: self.id,
                slot,
            });
        }
        let range = self.layout.slot_range(slot as usize);
        self.data[range].fill(0);
        self.set_slot_used(slot, false);
        Ok(())
    }

    /// Store a tuple in the lowest free slot, returning its record id
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> HeapResult<RecordId> {
        let slot = self
            .first_free_slot()
            .ok_or(HeapError::PageFull { page_id: self.id })?;
        self.write_slot(slot, tuple)?;
        Ok(RecordId::new(self.id, slot))
    }

    /// Free the slot addressed by `record_id`
    pub fn delete_tuple(&mut self, record_id: RecordId) -> HeapResult<()> {
        if record_id.page_id != self.id {
            return Err(HeapError::PageNotInFile {
                page_id: record_id.page_id,
            });
        }
        self.clear_slot(record_id.slot)
    }

    /// Occupied slots in ascending order, decoded with their record ids
    pub fn iter(&self) -> impl Iterator<Item = HeapResult<Tuple>> + '_ {
        (0..self.layout.slots as u16)
            .filter(|s| self.is_slot_used(*s))
            .map(|s| self.read_slot(s))
    }

    /// Decode every occupied slot
    pub fn tuples(&self) -> HeapResult<Vec<Tuple>> {
        self.iter().collect()
    }

    pub fn mark_dirty(&mut self, txn: Option<TransactionId>) {
        self.dirty = txn;
    }

    /// Transaction that last dirtied this page, if it is dirty
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirty
    }

    /// The page as it was when read or last checkpointed
    pub fn before_image(&self) -> HeapPage {
        HeapPage {
            id: self.id,
            schema: Arc::clone(&self.schema),
            layout: self.layout,
            data: self.before_image.clone(),
            before_image: self.before_image.clone(),
            dirty: None,
        }
    }

    /// Take the current contents as the new before image
    pub fn set_before_image(&mut self) {
        self.before_image = self.data.clone();
    }
}

impl std::fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapPage")
            .field("id", &self.id)
            .field("slots", &self.layout.slots)
            .field("occupied", &self.occupied_count())
            .field("dirty", &self.dirty)
            .finish()
    }
}
