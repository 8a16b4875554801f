use thiserror::Error;

use super::types::PageId;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on page {page_id}: {source}")]
    PageIo {
        page_id: PageId,
        #[source]
        source: std::io::Error,
    },

    #[error("Page full: cell size {required} exceeds largest usable free slot {available}")]
    PageFull { required: usize, available: usize },

    #[error("Invalid page size: expected {expected} bytes, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Page too small: {size} bytes, minimum is {minimum}")]
    PageTooSmall { size: usize, minimum: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Page {page_id} is corrupted: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Corrupted cell: {0}")]
    CorruptCell(String),

    #[error("Page id mismatch: expected {expected}, found {found}")]
    PageIdMismatch { expected: PageId, found: PageId },

    #[error("Duplicate key in page")]
    DuplicateKey,

    #[error("Buffer pool exhausted: all {capacity} resident pages are pinned")]
    CacheExhausted { capacity: usize },

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Already closed")]
    AlreadyClosed,

    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),

    #[error("Page {0} is reserved and cannot be used through the buffer pool")]
    ReservedPage(PageId),
}

pub type Result<T> = std::result::Result<T, StorageError>;
