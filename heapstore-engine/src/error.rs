//! Error kinds and error handling for the heap storage engine
//!
//! Every failure carries a coarse [`ErrorKind`] so callers can branch on the
//! class of failure without destructuring the detailed [`HeapError`].

use thiserror::Error;

use crate::storage::page::PageId;

/// Coarse classification of engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Schema construction inputs were rejected
    InvalidSchema,
    /// Field index outside the schema
    IndexOutOfRange,
    /// No field carries the requested name
    FieldNotFound,
    /// Tuple schema differs from the store schema
    SchemaMismatch,
    /// Page number at or beyond the end of the file
    PageOutOfRange,
    /// Fewer bytes than a full page were available
    TruncatedPage,
    /// Page or record belongs to another store
    PageNotInFile,
    /// Cursor exhausted, closed or never opened
    NoSuchElement,
    /// Underlying file-system failure
    IoFailure,
    /// File length is not a multiple of the page size
    MisalignedFile,
    /// Page bytes could not be decoded
    CorruptPage,
    /// A value does not fit its field or page slot
    InvalidValue,
    /// Slot-level misuse on a page
    InvalidSlot,
    /// The buffer pool could not serve a page
    BufferPool,
    /// A page lock could not be acquired in time
    LockTimeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::InvalidSchema => "invalid schema",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::FieldNotFound => "field not found",
            ErrorKind::SchemaMismatch => "schema mismatch",
            ErrorKind::PageOutOfRange => "page out of range",
            ErrorKind::TruncatedPage => "truncated page",
            ErrorKind::PageNotInFile => "page not in file",
            ErrorKind::NoSuchElement => "no such element",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::MisalignedFile => "misaligned file",
            ErrorKind::CorruptPage => "corrupt page",
            ErrorKind::InvalidValue => "invalid value",
            ErrorKind::InvalidSlot => "invalid slot",
            ErrorKind::BufferPool => "buffer pool",
            ErrorKind::LockTimeout => "lock timeout",
        })
    }
}

/// Main error type for the heap storage engine
#[derive(Error, Debug)]
pub enum HeapError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("field index {index} out of range for schema with {count} fields")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("no field named {0:?}")]
    FieldNotFound(String),

    #[error("tuple schema ({actual}) does not match store schema ({expected})")]
    SchemaMismatch { expected: String, actual: String },

    #[error("{page_id} is beyond the end of the file ({page_count} pages)")]
    PageOutOfRange { page_id: PageId, page_count: u32 },

    #[error("{page_id} truncated: read {read} of {expected} bytes")]
    TruncatedPage {
        page_id: PageId,
        read: usize,
        expected: usize,
    },

    #[error("{page_id} does not belong to this heap file")]
    PageNotInFile { page_id: PageId },

    #[error("no such element")]
    NoSuchElement,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file length {length} is not a multiple of page size {page_size}")]
    MisalignedFile { length: u64, page_size: usize },

    #[error("page size {page_size} cannot hold a tuple of {tuple_size} bytes")]
    PageTooSmall { page_size: usize, tuple_size: usize },

    #[error("page size {page_size} gives {slots} slots of {tuple_size} bytes, more than a u16 slot number can address")]
    TooManySlots {
        page_size: usize,
        tuple_size: usize,
        slots: usize,
    },

    #[error("{page_id} is corrupt: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("value of {length} bytes exceeds field width {max}")]
    ValueTooLong { length: usize, max: usize },

    #[error("field {index} expects {expected}, got {actual}")]
    TypeMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("tuple has no record id")]
    MissingRecordId,

    #[error("slot {slot} of {page_id} is empty")]
    SlotEmpty { page_id: PageId, slot: u16 },

    #[error("{page_id} has no free slot")]
    PageFull { page_id: PageId },

    #[error("{page_id} was fetched read-only")]
    ReadOnlyPage { page_id: PageId },

    #[error("table {0} is not registered with the buffer pool")]
    UnknownTable(crate::storage::page::TableId),

    #[error("page size {actual} does not match the buffer pool page size {expected}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("buffer pool full: no clean, unpinned page among {capacity} frames")]
    BufferPoolFull { capacity: usize },

    #[error("timed out waiting for lock on {page_id}")]
    LockTimeout { page_id: PageId },
}

impl HeapError {
    /// Get the coarse kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            HeapError::InvalidSchema(_) => ErrorKind::InvalidSchema,
            HeapError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            HeapError::FieldNotFound(_) => ErrorKind::FieldNotFound,
            HeapError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            HeapError::PageOutOfRange { .. } => ErrorKind::PageOutOfRange,
            HeapError::TruncatedPage { .. } => ErrorKind::TruncatedPage,
            HeapError::PageNotInFile { .. } => ErrorKind::PageNotInFile,
            HeapError::NoSuchElement => ErrorKind::NoSuchElement,
            HeapError::Io(_) => ErrorKind::IoFailure,
            HeapError::MisalignedFile { .. } => ErrorKind::MisalignedFile,
            HeapError::PageTooSmall { .. } | HeapError::TooManySlots { .. } => {
                ErrorKind::InvalidSchema
            }
            HeapError::CorruptPage { .. } => ErrorKind::CorruptPage,
            HeapError::ValueTooLong { .. } | HeapError::TypeMismatch { .. } => {
                ErrorKind::InvalidValue
            }
            HeapError::MissingRecordId
            | HeapError::SlotEmpty { .. }
            | HeapError::PageFull { .. }
            | HeapError::ReadOnlyPage { .. } => ErrorKind::InvalidSlot,
            HeapError::UnknownTable(_)
            | HeapError::PageSizeMismatch { .. }
            | HeapError::BufferPoolFull { .. } => ErrorKind::BufferPool,
            HeapError::LockTimeout { .. } => ErrorKind::LockTimeout,
        }
    }
}

/// Result type for heap storage operations
pub type HeapResult<T> = Result<T, HeapError>;
