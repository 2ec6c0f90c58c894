//! LRU buffer pool for heap pages
//!
//! The pool is an arena of page frames keyed by [`PageId`]. Callers never get
//! references into the arena; they get [`PageHandle`]s that share ownership
//! of a frame, so evicting a page can never invalidate a page someone holds.
//! A frame with outstanding handles is pinned and is never chosen for
//! eviction. Dirty pages are not evicted either (no-steal): they stay until
//! their transaction commits or aborts.

use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::locking::{PageLockManager, Permission};
use super::PageCache;
use crate::config::EngineConfig;
use crate::error::{HeapError, HeapResult};
use crate::storage::heap_file::HeapFile;
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::TransactionId;

type Frame = Arc<RwLock<HeapPage>>;

/// Shared handle to a cached page
#[derive(Clone)]
pub struct PageHandle {
    page_id: PageId,
    permission: Permission,
    frame: Frame,
}

impl PageHandle {
    /// Wrap a page that is not owned by any pool
    pub fn detached(page: HeapPage, permission: Permission) -> Self {
        PageHandle {
            page_id: page.id(),
            permission,
            frame: Arc::new(RwLock::new(page)),
        }
    }

    pub fn id(&self) -> PageId {
        self.page_id
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.frame.read()
    }

    /// Mutable access; only for handles fetched read-write
    pub fn write(&self) -> HeapResult<RwLockWriteGuard<'_, HeapPage>> {
        if self.permission != Permission::ReadWrite {
            return Err(HeapError::ReadOnlyPage {
                page_id: self.page_id,
            });
        }
        Ok(self.frame.write())
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_id", &self.page_id)
            .field("permission", &self.permission)
            .finish()
    }
}

/// Buffer pool statistics
#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub flushes: u64,
}

/// Thread-safe LRU buffer pool
pub struct BufferPool {
    frames: Mutex<LruCache<PageId, Frame>>,
    files: RwLock<HashMap<TableId, Arc<HeapFile>>>,
    locks: PageLockManager,
    capacity: usize,
    page_size: usize,
    stats: RwLock<PoolStats>,
}

impl BufferPool {
    /// Create a pool from engine settings
    pub fn new(config: &EngineConfig) -> Self {
        let capacity = NonZeroUsize::new(config.pool_pages).unwrap_or(NonZeroUsize::MIN);
        BufferPool {
            frames: Mutex::new(LruCache::new(capacity)),
            files: RwLock::new(HashMap::new()),
            locks: PageLockManager::new(config.lock_timeout()),
            capacity: capacity.get(),
            page_size: config.page_size,
            stats: RwLock::new(PoolStats::default()),
        }
    }

    /// Create a pool with default settings and the given capacity (pages)
    pub fn with_capacity(pool_pages: usize) -> Self {
        Self::new(&EngineConfig {
            pool_pages,
            ..EngineConfig::default()
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Make a heap file's pages loadable through this pool
    pub fn register(&self, file: Arc<HeapFile>) -> HeapResult<()> {
        if file.page_size() != self.page_size {
            return Err(HeapError::PageSizeMismatch {
                expected: self.page_size,
                actual: file.page_size(),
            });
        }
        tracing::debug!("Registered table {} ({})", file.id(), file.path().display());
        self.files.write().insert(file.id(), file);
        Ok(())
    }

    /// Get a registered heap file
    pub fn file(&self, table_id: TableId) -> Option<Arc<HeapFile>> {
        self.files.read().get(&table_id).cloned()
    }

    fn file_for(&self, page_id: PageId) -> HeapResult<Arc<HeapFile>> {
        self.file(page_id.table_id)
            .ok_or(HeapError::UnknownTable(page_id.table_id))
    }

    /// Evict the least recently used clean, unpinned page
    fn evict_page(&self, frames: &mut LruCache<PageId, Frame>) -> HeapResult<()> {
        let victim = frames
            .iter()
            .rev()
            .find(|(_, frame)| {
                Arc::strong_count(frame) == 1
                    && frame
                        .try_read()
                        .is_some_and(|page| page.dirtied_by().is_none())
            })
            .map(|(page_id, _)| *page_id);

        match victim {
            Some(page_id) => {
                frames.pop(&page_id);
                self.stats.write().evictions += 1;
                tracing::debug!("Evicted {}", page_id);
                Ok(())
            }
            None => {
                tracing::warn!("Buffer pool full: no clean, unpinned page among {} frames", frames.len());
                Err(HeapError::BufferPoolFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Write a dirty page through its heap file and mark it clean
    fn write_back(&self, page: &mut HeapPage) -> HeapResult<()> {
        let file = self.file_for(page.id())?;
        file.write_page(page)?;
        page.mark_dirty(None);
        page.set_before_image();
        self.stats.write().flushes += 1;
        Ok(())
    }

    fn snapshot_frames(&self) -> Vec<Frame> {
        self.frames.lock().iter().map(|(_, f)| Arc::clone(f)).collect()
    }

    /// Flush one page if it is cached and dirty
    pub fn flush_page(&self, page_id: PageId) -> HeapResult<()> {
        let frame = self.frames.lock().peek(&page_id).cloned();
        if let Some(frame) = frame {
            let mut page = frame.write();
            if page.dirtied_by().is_some() {
                self.write_back(&mut page)?;
            }
        }
        Ok(())
    }

    /// Flush every page dirtied by `txn`
    pub fn flush_pages(&self, txn: TransactionId) -> HeapResult<()> {
        for frame in self.snapshot_frames() {
            let mut page = frame.write();
            if page.dirtied_by() == Some(txn) {
                self.write_back(&mut page)?;
            }
        }
        Ok(())
    }

    /// Flush every dirty page
    pub fn flush_all_pages(&self) -> HeapResult<()> {
        for frame in self.snapshot_frames() {
            let mut page = frame.write();
            if page.dirtied_by().is_some() {
                self.write_back(&mut page)?;
            }
        }
        Ok(())
    }

    /// Drop a page from the pool without writing it
    pub fn discard_page(&self, page_id: PageId) {
        self.frames.lock().pop(&page_id);
    }

    /// Commit or abort a transaction and release all of its locks
    ///
    /// Commit writes the transaction's dirty pages; abort restores their
    /// before images in memory.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> HeapResult<()> {
        let mut result = Ok(());
        for frame in self.snapshot_frames() {
            let mut page = frame.write();
            if page.dirtied_by() != Some(txn) {
                continue;
            }
            if commit {
                if let Err(e) = self.write_back(&mut page) {
                    result = Err(e);
                    break;
                }
            } else {
                *page = page.before_image();
            }
        }

        let released = self.locks.release_all(txn);
        tracing::debug!(
            "{} {} ({} locks released)",
            txn,
            if commit { "committed" } else { "aborted" },
            released.len()
        );
        result
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.read().clone()
    }

    /// Number of cached pages
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.frames.lock().contains(&page_id)
    }
}

impl BufferPool {
    /// Find or load the frame for a page; the caller already holds its lock
    fn fetch_frame(&self, page_id: PageId) -> HeapResult<Frame> {
        if let Some(frame) = self.frames.lock().get(&page_id) {
            self.stats.write().hits += 1;
            tracing::trace!("Cache hit for {}", page_id);
            return Ok(Arc::clone(frame));
        }

        // Miss: read without holding the arena so other misses can proceed
        self.stats.write().misses += 1;
        let file = self.file_for(page_id)?;
        let page = file.read_page(page_id)?;

        let mut frames = self.frames.lock();
        if let Some(frame) = frames.get(&page_id) {
            // Loaded by another reader in the meantime
            return Ok(Arc::clone(frame));
        }
        if frames.len() >= self.capacity {
            self.evict_page(&mut frames)?;
        }

        let frame = Arc::new(RwLock::new(page));
        frames.put(page_id, Arc::clone(&frame));
        Ok(frame)
    }
}

impl PageCache for BufferPool {
    fn get_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> HeapResult<PageHandle> {
        let held_before = self.locks.holds_lock(txn, page_id);
        self.locks.acquire(txn, page_id, permission)?;

        match self.fetch_frame(page_id) {
            Ok(frame) => Ok(PageHandle {
                page_id,
                permission,
                frame,
            }),
            Err(e) => {
                // Do not keep a lock on a page the caller never received
                if !held_before {
                    self.locks.release(txn, page_id);
                }
                Err(e)
            }
        }
    }

    fn release_page(&self, txn: TransactionId, page_id: PageId) {
        self.locks.release(txn, page_id);
    }

    fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.locks.holds_lock(txn, page_id)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::schema::{FieldType, Schema};
    use crate::storage::tuple::{Field, Tuple};
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 256;

    fn setup(dir: &std::path::Path, pages: u32, pool_pages: usize) -> (Arc<HeapFile>, BufferPool) {
        let schema = Arc::new(Schema::from_types(&[FieldType::Int]).unwrap());
        let file = Arc::new(HeapFile::create(dir.join("t.dat"), schema.clone(), PAGE_SIZE).unwrap());
        for n in 0..pages {
            let page = HeapPage::empty(PageId::new(file.id(), n), schema.clone(), PAGE_SIZE).unwrap();
            file.write_page(&page).unwrap();
        }
        let pool = BufferPool::new(&EngineConfig {
            page_size: PAGE_SIZE,
            pool_pages,
            lock_timeout_ms: 50,
        });
        pool.register(file.clone()).unwrap();
        (file, pool)
    }

    fn int_row(file: &HeapFile, v: i32) -> Tuple {
        Tuple::new(file.schema().clone(), vec![Field::Int(v)]).unwrap()
    }

    #[test]
    fn test_hit_and_miss() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 2, 8);
        let txn = TransactionId::new();
        let pid = PageId::new(file.id(), 1);

        pool.get_page(txn, pid, Permission::ReadOnly).unwrap();
        pool.get_page(txn, pid, Permission::ReadOnly).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!(pool.contains(pid));
    }

    #[test]
    fn test_unknown_table() {
        let pool = BufferPool::with_capacity(4);
        let pid = PageId::new(TableId(99), 0);
        let err = pool.get_page(TransactionId::new(), pid, Permission::ReadOnly).unwrap_err();
        assert!(matches!(err, HeapError::UnknownTable(_)));
    }

    #[test]
    fn test_register_rejects_other_page_size() {
        let dir = tempdir().unwrap();
        let (file, _) = setup(dir.path(), 0, 4);
        let pool = BufferPool::with_capacity(4);
        assert_eq!(pool.register(file).unwrap_err().kind(), ErrorKind::BufferPool);
    }

    #[test]
    fn test_read_only_handle_cannot_write() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let handle = pool
            .get_page(TransactionId::new(), PageId::new(file.id(), 0), Permission::ReadOnly)
            .unwrap();
        assert!(matches!(handle.write(), Err(HeapError::ReadOnlyPage { .. })));
    }

    #[test]
    fn test_evicts_lru_clean_page() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 3, 2);
        let txn = TransactionId::new();

        for n in 0..3 {
            pool.get_page(txn, PageId::new(file.id(), n), Permission::ReadOnly).unwrap();
        }
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(PageId::new(file.id(), 0)));
        assert_eq!(pool.stats().evictions, 1);
    }

    #[test]
    fn test_dirty_pages_are_not_evicted() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 2, 1);
        let txn = TransactionId::new();
        let pid = PageId::new(file.id(), 0);

        {
            let handle = pool.get_page(txn, pid, Permission::ReadWrite).unwrap();
            let mut page = handle.write().unwrap();
            page.insert_tuple(&int_row(&file, 1)).unwrap();
            page.mark_dirty(Some(txn));
        }

        let err = pool
            .get_page(txn, PageId::new(file.id(), 1), Permission::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, HeapError::BufferPoolFull { .. }));
    }

    #[test]
    fn test_commit_writes_dirty_pages() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let txn = TransactionId::new();
        let pid = PageId::new(file.id(), 0);

        {
            let handle = pool.get_page(txn, pid, Permission::ReadWrite).unwrap();
            let mut page = handle.write().unwrap();
            page.insert_tuple(&int_row(&file, 42)).unwrap();
            page.mark_dirty(Some(txn));
        }
        assert_eq!(file.read_page(pid).unwrap().occupied_count(), 0);

        pool.transaction_complete(txn, true).unwrap();
        assert_eq!(file.read_page(pid).unwrap().occupied_count(), 1);
        assert!(!pool.holds_lock(txn, pid));
        assert_eq!(pool.stats().flushes, 1);
    }

    #[test]
    fn test_abort_restores_before_image() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let txn = TransactionId::new();
        let pid = PageId::new(file.id(), 0);

        {
            let handle = pool.get_page(txn, pid, Permission::ReadWrite).unwrap();
            let mut page = handle.write().unwrap();
            page.insert_tuple(&int_row(&file, 7)).unwrap();
            page.mark_dirty(Some(txn));
        }
        pool.transaction_complete(txn, false).unwrap();

        let other = TransactionId::new();
        let handle = pool.get_page(other, pid, Permission::ReadOnly).unwrap();
        assert_eq!(handle.read().occupied_count(), 0);
        assert!(handle.read().dirtied_by().is_none());
        assert_eq!(file.read_page(pid).unwrap().occupied_count(), 0);
    }

    #[test]
    fn test_failed_fetch_releases_lock() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let txn = TransactionId::new();
        let missing = PageId::new(file.id(), 5);

        let err = pool.get_page(txn, missing, Permission::ReadWrite).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PageOutOfRange);
        assert!(!pool.holds_lock(txn, missing));

        let unknown = PageId::new(TableId(99), 0);
        assert!(pool.get_page(txn, unknown, Permission::ReadOnly).is_err());
        assert!(!pool.holds_lock(txn, unknown));
    }

    #[test]
    fn test_failed_fetch_keeps_lock_held_before() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 2, 1);
        let txn = TransactionId::new();
        let (p0, p1) = (PageId::new(file.id(), 0), PageId::new(file.id(), 1));

        pool.get_page(txn, p1, Permission::ReadOnly).unwrap();
        {
            // Evicts p1, then pins the only frame with a dirty page
            let handle = pool.get_page(txn, p0, Permission::ReadWrite).unwrap();
            let mut page = handle.write().unwrap();
            page.insert_tuple(&int_row(&file, 1)).unwrap();
            page.mark_dirty(Some(txn));
        }
        assert!(!pool.contains(p1));

        let err = pool.get_page(txn, p1, Permission::ReadOnly).unwrap_err();
        assert!(matches!(err, HeapError::BufferPoolFull { .. }));
        assert!(pool.holds_lock(txn, p1));

        pool.transaction_complete(txn, true).unwrap();
        assert!(!pool.holds_lock(txn, p1));
    }

    #[test]
    fn test_concurrent_misses_share_one_frame() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let pool = Arc::new(pool);
        let pid = PageId::new(file.id(), 0);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let handle = pool.get_page(TransactionId::new(), pid, Permission::ReadOnly).unwrap();
                    let count = handle.read().occupied_count();
                    count
                })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 0);
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_conflicting_writer_times_out() {
        let dir = tempdir().unwrap();
        let (file, pool) = setup(dir.path(), 1, 4);
        let pid = PageId::new(file.id(), 0);

        pool.get_page(TransactionId::new(), pid, Permission::ReadWrite).unwrap();
        let err = pool
            .get_page(TransactionId::new(), pid, Permission::ReadOnly)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
    }
}
