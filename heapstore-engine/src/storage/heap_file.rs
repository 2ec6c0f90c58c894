//! Heap files: unordered tuple storage in fixed-size pages
//!
//! A heap file is a flat concatenation of page images. Page `n` occupies
//! bytes `[n * page_size, (n + 1) * page_size)` and the page count is derived
//! from the file length alone; nothing else is stored on disk.
//!
//! The file handle is opened per call and released when the call returns,
//! on every path. Uncached reads and writes go straight to disk; inserts,
//! deletes and scans go through a [`PageCache`], which owns locking.

use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::page::{HeapPage, PageId, PageLayout, TableId};
use super::scan::HeapScan;
use super::schema::Schema;
use super::tuple::Tuple;
use crate::buffer::{PageCache, Permission};
use crate::error::{HeapError, HeapResult};
use crate::transaction::TransactionId;

/// A table stored as a sequence of heap pages in one file
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    table_id: TableId,
    schema: Arc<Schema>,
    layout: PageLayout,
    /// Held from choosing a new page number until its image is on disk
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Bind a heap file to `path`; the file need not exist yet
    pub fn open(path: impl Into<PathBuf>, schema: Arc<Schema>, page_size: usize) -> HeapResult<Self> {
        let path = path.into();
        let layout = PageLayout::for_schema(page_size, &schema)?;
        let table_id = table_id_for(&path);
        Ok(HeapFile {
            path,
            table_id,
            schema,
            layout,
            append_lock: Mutex::new(()),
        })
    }

    /// Create a new, empty heap file; fails if the file already exists
    pub fn create(path: impl Into<PathBuf>, schema: Arc<Schema>, page_size: usize) -> HeapResult<Self> {
        let path = path.into();
        // Validate the layout before touching the file system
        PageLayout::for_schema(page_size, &schema)?;
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        tracing::debug!("Created heap file {}", path.display());
        Self::open(path, schema, page_size)
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table identifier derived from the canonical file path
    ///
    /// Unrelated paths may collide; the id is stable but not guaranteed unique.
    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.layout.page_size
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    fn file_len(&self) -> HeapResult<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of pages, failing if the length is not a whole number of pages
    pub fn page_count(&self) -> HeapResult<u32> {
        let length = self.file_len()?;
        let page_size = self.page_size() as u64;
        if length % page_size != 0 {
            return Err(HeapError::MisalignedFile {
                length,
                page_size: self.page_size(),
            });
        }
        Ok((length / page_size) as u32)
    }

    fn check_owned(&self, page_id: PageId) -> HeapResult<()> {
        if page_id.table_id != self.table_id {
            return Err(HeapError::PageNotInFile { page_id });
        }
        Ok(())
    }

    fn offset_of(&self, page_id: PageId) -> u64 {
        page_id.page_number as u64 * self.page_size() as u64
    }

    /// Read a page directly from disk, bypassing any cache
    pub fn read_page(&self, page_id: PageId) -> HeapResult<HeapPage> {
        self.check_owned(page_id)?;

        let page_size = self.page_size();
        let offset = self.offset_of(page_id);
        let out_of_range = |length: u64| HeapError::PageOutOfRange {
            page_id,
            page_count: (length / page_size as u64) as u32,
        };

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(out_of_range(0)),
            Err(e) => return Err(e.into()),
        };
        let length = file.metadata()?.len();
        if offset + page_size as u64 > length {
            return Err(out_of_range(length));
        }

        let data = read_page_image(&mut file, page_id, offset, page_size)?;

        tracing::debug!("Read {} from {}", page_id, self.path.display());
        HeapPage::from_bytes(page_id, Arc::clone(&self.schema), data)
    }

    /// Write a page image at its offset, extending the file when appending
    pub fn write_page(&self, page: &HeapPage) -> HeapResult<()> {
        let page_id = page.id();
        self.check_owned(page_id)?;
        if page.data().len() != self.page_size() {
            return Err(HeapError::PageSizeMismatch {
                expected: self.page_size(),
                actual: page.data().len(),
            });
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        let length = file.metadata()?.len();
        let offset = self.offset_of(page_id);
        if offset > length {
            // Writing here would leave a hole of unwritten pages
            return Err(HeapError::PageOutOfRange {
                page_id,
                page_count: (length / self.page_size() as u64) as u32,
            });
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.data())?;
        file.sync_data()?;

        tracing::debug!("Wrote {} to {}", page_id, self.path.display());
        Ok(())
    }

    /// Append an empty page and return its id
    ///
    /// Concurrent appenders are serialized so two of them can never pick the
    /// same page number and zero a page the other has already filled.
    fn append_empty_page(&self) -> HeapResult<PageId> {
        let _append = self.append_lock.lock();
        let page_id = PageId::new(self.table_id, self.page_count()?);
        let page = HeapPage::empty(page_id, Arc::clone(&self.schema), self.page_size())?;
        self.write_page(&page)?;
        tracing::debug!("Appended {}", page_id);
        Ok(page_id)
    }

    /// Insert a tuple into the first page with a free slot, appending a page
    /// when every page is full
    ///
    /// On success the tuple carries its new record id and the ids of the
    /// modified pages are returned.
    pub fn insert_tuple<C: PageCache + ?Sized>(
        &self,
        txn: TransactionId,
        cache: &C,
        tuple: &mut Tuple,
    ) -> HeapResult<Vec<PageId>> {
        if **tuple.schema() != *self.schema {
            return Err(HeapError::SchemaMismatch {
                expected: self.schema.describe(),
                actual: tuple.schema().describe(),
            });
        }

        let mut next_page = 0;
        loop {
            let page_count = self.page_count()?;
            for page_number in next_page..page_count {
                let page_id = PageId::new(self.table_id, page_number);
                let held_before = cache.holds_lock(txn, page_id);
                let handle = cache.get_page(txn, page_id, Permission::ReadWrite)?;

                let inserted = {
                    let mut page = handle.write()?;
                    if page.first_free_slot().is_some() {
                        let record_id = page.insert_tuple(tuple)?;
                        page.mark_dirty(Some(txn));
                        Some(record_id)
                    } else {
                        None
                    }
                };

                match inserted {
                    Some(record_id) => {
                        tuple.set_record_id(Some(record_id));
                        return Ok(vec![page_id]);
                    }
                    None => {
                        // Full and untouched: no need to keep it locked
                        drop(handle);
                        if !held_before {
                            cache.release_page(txn, page_id);
                        }
                    }
                }
            }

            // Every existing page was full. Another writer may append at the
            // same time, so a freshly appended page can already be full.
            next_page = page_count;
            let page_id = self.append_empty_page()?;
            let handle = cache.get_page(txn, page_id, Permission::ReadWrite)?;
            let mut page = handle.write()?;
            if page.first_free_slot().is_some() {
                let record_id = page.insert_tuple(tuple)?;
                page.mark_dirty(Some(txn));
                tuple.set_record_id(Some(record_id));
                return Ok(vec![page_id]);
            }
        }
    }

    /// Delete the tuple at its record id, returning the modified page id
    pub fn delete_tuple<C: PageCache + ?Sized>(
        &self,
        txn: TransactionId,
        cache: &C,
        tuple: &Tuple,
    ) -> HeapResult<Vec<PageId>> {
        let record_id = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        let page_id = record_id.page_id;
        self.check_owned(page_id)?;
        if page_id.page_number >= self.page_count()? {
            return Err(HeapError::PageNotInFile { page_id });
        }

        let handle = cache.get_page(txn, page_id, Permission::ReadWrite)?;
        let mut page = handle.write()?;
        page.delete_tuple(record_id)?;
        page.mark_dirty(Some(txn));
        Ok(vec![page_id])
    }

    /// Sequential scan over every tuple, in page then slot order
    pub fn scan<'a, C: PageCache + ?Sized>(&'a self, txn: TransactionId, cache: &'a C) -> HeapScan<'a, C> {
        HeapScan::new(self, cache, txn)
    }
}

/// Read exactly one page image at `offset`
fn read_page_image<R: Read + Seek>(
    reader: &mut R,
    page_id: PageId,
    offset: u64,
    page_size: usize,
) -> HeapResult<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut data = Vec::with_capacity(page_size);
    reader.by_ref().take(page_size as u64).read_to_end(&mut data)?;
    if data.len() < page_size {
        return Err(HeapError::TruncatedPage {
            page_id,
            read: data.len(),
            expected: page_size,
        });
    }
    Ok(data)
}

/// Derive a table id from the canonical form of `path`
///
/// Files that do not exist yet are canonicalized through their parent
/// directory so the id does not change once the file is created.
fn table_id_for(path: &Path) -> TableId {
    let canonical = path.canonicalize().unwrap_or_else(|_| {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default()
            .join(path.file_name().unwrap_or_default())
    });

    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    TableId(hasher.finish())
}
