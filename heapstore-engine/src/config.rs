//! Engine configuration
//!
//! Settings are fixed for the lifetime of a buffer pool and every heap file
//! registered with it. All fields have defaults so partial TOML tables work.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool capacity in pages
pub const DEFAULT_POOL_PAGES: usize = 1000;

/// Default lock wait before giving up, in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Page size in bytes, shared by every store using one pool
    pub page_size: usize,
    /// Buffer pool capacity (number of pages)
    pub pool_pages: usize,
    /// How long a page lock request waits on a conflict
    pub lock_timeout_ms: u64,
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: DEFAULT_PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}
