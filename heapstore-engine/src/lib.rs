//! Heapstore Engine - paged heap-file storage
//!
//! This crate provides the storage core of a relational engine: fixed-width
//! tuples described by a schema, stored unordered in fixed-size pages of a
//! single file per table, read back through a sequential scan. Cached page
//! access and page locking go through a buffer pool.

pub mod buffer;
pub mod config;
pub mod error;
pub mod storage;
pub mod transaction;

pub use buffer::{BufferPool, PageCache, PageHandle, Permission};
pub use config::EngineConfig;
pub use error::{ErrorKind, HeapError, HeapResult};
pub use storage::{Field, FieldType, HeapFile, HeapScan, PageId, RecordId, Schema, TableId, Tuple};
pub use transaction::TransactionId;
