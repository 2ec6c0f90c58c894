//! Storage layer for heap files
//!
//! This module handles the on-disk representation of tables:
//! - Schemas and tuple encoding
//! - Slotted heap pages
//! - Heap file page I/O, inserts and deletes
//! - Sequential scans

pub mod schema;
pub mod tuple;
pub mod page;
pub mod heap_file;
pub mod scan;

pub use schema::{FieldDescriptor, FieldType, Schema, TEXT_LEN};
pub use tuple::{Field, Tuple};
pub use page::{HeapPage, PageId, PageLayout, RecordId, TableId};
pub use heap_file::HeapFile;
pub use scan::{HeapScan, ScanIter};
