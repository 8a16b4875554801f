//! Celldb - the page-storage core of an embedded database
//!
//! Data lives in fixed-size pages of key-ordered cells. Pages are read and
//! written through a page manager, cached in an LRU buffer pool and grouped
//! into a database file whose first page records database-wide metadata.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): page layout and disk I/O
//!   - `Cell`: record and pointer cells with their binary codec
//!   - `Page`: slotted page with a sorted slot directory and best-fit
//!     free-space allocation
//!   - `PageManager`: reads, writes and allocates pages in a `HostFile`
//!
//! - **Buffer** (`buffer`): in-memory caching of pages
//!   - `BufferPool`: pin-aware page cache with dirty write-back
//!   - `LruReplacer`: least recently used victim selection
//!
//! - **Database** (`database`): the database file
//!   - `DatabaseFile`: header page, tables page, page allocation and config
//!
//! # Example
//!
//! ```rust,no_run
//! use celldb::common::StorageConfig;
//! use celldb::database::DatabaseFile;
//!
//! let db = DatabaseFile::create_path("test.db", StorageConfig::default()).unwrap();
//!
//! let page_id = db.allocate_new_page().unwrap();
//! db.with_pinned_page(page_id, |page| page.store_record_cell(b"hello", b"world"))
//!     .unwrap();
//!
//! db.config().unwrap().set_string("owner", "celldb").unwrap();
//! db.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod database;
pub mod storage;

pub use buffer::BufferPool;
pub use common::{PageId, Result, StorageConfig, StorageError};
pub use database::DatabaseFile;
pub use storage::page::{Cell, Page};
