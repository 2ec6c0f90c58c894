//! Page-level locking for transactions sharing a buffer pool
//!
//! Read-only requests take a shared lock, read-write requests an exclusive
//! one. Locks are held until the transaction completes or the page is
//! released explicitly. Conflicting requests wait up to a timeout.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::error::{HeapError, HeapResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Access mode requested for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// Lock state of one page
#[derive(Debug, Default)]
struct PageLockState {
    exclusive_holder: Option<TransactionId>,
    shared_holders: HashSet<TransactionId>,
}

impl PageLockState {
    fn is_free(&self) -> bool {
        self.exclusive_holder.is_none() && self.shared_holders.is_empty()
    }

    fn try_acquire(&mut self, txn: TransactionId, permission: Permission) -> bool {
        match self.exclusive_holder {
            Some(holder) if holder == txn => return true,
            Some(_) => return false,
            None => {}
        }

        match permission {
            Permission::ReadOnly => {
                self.shared_holders.insert(txn);
                true
            }
            Permission::ReadWrite => {
                // Upgrade is allowed when we are the only reader
                if self.shared_holders.iter().any(|h| *h != txn) {
                    return false;
                }
                self.shared_holders.clear();
                self.exclusive_holder = Some(txn);
                true
            }
        }
    }

    fn release(&mut self, txn: TransactionId) {
        if self.exclusive_holder == Some(txn) {
            self.exclusive_holder = None;
        }
        self.shared_holders.remove(&txn);
    }
}

#[derive(Debug, Default)]
struct LockTable {
    pages: HashMap<PageId, PageLockState>,
    held: HashMap<TransactionId, HashSet<PageId>>,
}

/// Lock manager for pages
pub struct PageLockManager {
    table: Mutex<LockTable>,
    /// Lock timeout for conflicting requests
    timeout: Duration,
}

impl PageLockManager {
    /// Create a new lock manager
    pub fn new(timeout: Duration) -> Self {
        PageLockManager {
            table: Mutex::new(LockTable::default()),
            timeout,
        }
    }

    /// Acquire a lock, waiting up to the timeout on conflicts
    pub fn acquire(
        &self,
        txn: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> HeapResult<()> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let mut table = self.table.lock();
            let granted = table
                .pages
                .entry(page_id)
                .or_default()
                .try_acquire(txn, permission);

            if granted {
                table.held.entry(txn).or_default().insert(page_id);
                return Ok(());
            }

            if Instant::now() >= deadline {
                tracing::warn!("{} timed out waiting for {:?} lock on {}", txn, permission, page_id);
                return Err(HeapError::LockTimeout { page_id });
            }

            // Drop lock and wait
            drop(table);
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Release one page lock held by a transaction
    pub fn release(&self, txn: TransactionId, page_id: PageId) {
        let mut table = self.table.lock();
        Self::release_locked(&mut table, txn, page_id);
        if let Some(held) = table.held.get_mut(&txn) {
            held.remove(&page_id);
            if held.is_empty() {
                table.held.remove(&txn);
            }
        }
    }

    fn release_locked(table: &mut LockTable, txn: TransactionId, page_id: PageId) {
        if let Some(state) = table.pages.get_mut(&page_id) {
            state.release(txn);
            if state.is_free() {
                table.pages.remove(&page_id);
            }
        }
    }

    /// Release every lock of a transaction, returning the pages it held
    pub fn release_all(&self, txn: TransactionId) -> Vec<PageId> {
        let mut table = self.table.lock();
        let held: Vec<PageId> = table
            .held
            .remove(&txn)
            .map(|pages| pages.into_iter().collect())
            .unwrap_or_default();
        for page_id in &held {
            Self::release_locked(&mut table, txn, *page_id);
        }
        held
    }

    /// Check whether a transaction holds any lock on a page
    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.table
            .lock()
            .held
            .get(&txn)
            .is_some_and(|pages| pages.contains(&page_id))
    }

    /// Check whether a transaction holds the exclusive lock on a page
    pub fn holds_exclusive(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.table
            .lock()
            .pages
            .get(&page_id)
            .is_some_and(|state| state.exclusive_holder == Some(txn))
    }
}

impl Default for PageLockManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_LOCK_TIMEOUT_MS))
    }
}
