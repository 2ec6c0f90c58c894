//! Sequential scan over a heap file
//!
//! The cursor walks pages in ascending order and yields the occupied slots
//! of each page in ascending slot order. Pages are fetched read-only through
//! the page cache one at a time; the tuples of the current page are decoded
//! when the cursor reaches it. The page count is re-read whenever the cursor
//! moves past a page, so pages appended during the scan are visited.

use std::vec;

use super::heap_file::HeapFile;
use super::page::PageId;
use super::tuple::Tuple;
use crate::buffer::{PageCache, Permission};
use crate::error::{HeapError, HeapResult};
use crate::transaction::TransactionId;

/// Cursor over every tuple of a heap file
///
/// A new cursor is closed; call [`HeapScan::open`] before reading.
pub struct HeapScan<'a, C: PageCache + ?Sized> {
    file: &'a HeapFile,
    cache: &'a C,
    txn: TransactionId,
    page_number: u32,
    current: Option<vec::IntoIter<Tuple>>,
}

impl<'a, C: PageCache + ?Sized> HeapScan<'a, C> {
    pub(crate) fn new(file: &'a HeapFile, cache: &'a C, txn: TransactionId) -> Self {
        HeapScan {
            file,
            cache,
            txn,
            page_number: 0,
            current: None,
        }
    }

    /// Position the cursor before the first tuple
    pub fn open(&mut self) -> HeapResult<()> {
        self.page_number = 0;
        let tuples = if self.file.page_count()? > 0 {
            self.load_page(0)?
        } else {
            Vec::new()
        };
        self.current = Some(tuples.into_iter());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    fn load_page(&self, page_number: u32) -> HeapResult<Vec<Tuple>> {
        let page_id = PageId::new(self.file.id(), page_number);
        let handle = self
            .cache
            .get_page(self.txn, page_id, Permission::ReadOnly)?;
        let tuples = handle.read().tuples()?;
        tracing::trace!("Scan loaded {} tuples from {}", tuples.len(), page_id);
        Ok(tuples)
    }

    /// Whether another tuple is available, advancing over empty pages
    ///
    /// A closed cursor has nothing next.
    pub fn has_next(&mut self) -> HeapResult<bool> {
        loop {
            let Some(current) = self.current.as_ref() else {
                return Ok(false);
            };
            if current.len() > 0 {
                return Ok(true);
            }

            let next_page = self.page_number + 1;
            if next_page >= self.file.page_count()? {
                return Ok(false);
            }
            let tuples = self.load_page(next_page)?;
            self.page_number = next_page;
            self.current = Some(tuples.into_iter());
        }
    }

    /// Next tuple in page-then-slot order
    pub fn next(&mut self) -> HeapResult<Tuple> {
        if !self.has_next()? {
            return Err(HeapError::NoSuchElement);
        }
        self.current
            .as_mut()
            .and_then(|tuples| tuples.next())
            .ok_or(HeapError::NoSuchElement)
    }

    /// Restart from the first tuple
    pub fn rewind(&mut self) -> HeapResult<()> {
        self.close();
        self.open()
    }

    /// Close the cursor; it may be reopened
    pub fn close(&mut self) {
        self.current = None;
    }

    /// Iterate the remaining tuples
    ///
    /// Stops after the first error.
    pub fn iter(&mut self) -> ScanIter<'_, 'a, C> {
        ScanIter {
            scan: self,
            failed: false,
        }
    }
}

/// Iterator adapter returned by [`HeapScan::iter`]
pub struct ScanIter<'s, 'a, C: PageCache + ?Sized> {
    scan: &'s mut HeapScan<'a, C>,
    failed: bool,
}

impl<C: PageCache + ?Sized> Iterator for ScanIter<'_, '_, C> {
    type Item = HeapResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.scan.has_next() {
            Ok(false) => None,
            Ok(true) => Some(self.scan.next()),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
