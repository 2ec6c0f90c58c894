//! Buffer management for heap pages
//!
//! The storage core reaches cached pages only through the [`PageCache`]
//! trait. [`BufferPool`] is the bundled implementation: an LRU arena of
//! page frames guarded by page-level transaction locks.

pub mod locking;
pub mod pool;

pub use locking::{PageLockManager, Permission};
pub use pool::{BufferPool, PageHandle, PoolStats};

use crate::error::HeapResult;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Source of cached, lock-protected pages
pub trait PageCache {
    /// Fetch a page for `txn`, locking it according to `permission`
    fn get_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> HeapResult<PageHandle>;

    /// Drop `txn`'s lock on a page before the transaction completes
    fn release_page(&self, txn: TransactionId, page_id: PageId);

    /// Whether `txn` currently holds any lock on the page
    fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool;
}
