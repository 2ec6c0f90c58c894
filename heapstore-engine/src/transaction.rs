//! Transaction identifiers
//!
//! The storage core never inspects a transaction id; it only threads it
//! through to the buffer pool for lock and dirty-page attribution.

use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction ID counter
static TRANSACTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque transaction token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate a fresh, process-unique transaction id
    pub fn new() -> Self {
        TransactionId(TRANSACTION_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn {}", self.0)
    }
}
