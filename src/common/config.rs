use super::error::{Result, StorageError};

/// Default size of a page in bytes (16 KB)
pub const DEFAULT_PAGE_SIZE: usize = 16 * 1024;

/// Default buffer pool capacity in pages
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// Smallest page size accepted by [`StorageConfig::validate`].
pub const MIN_PAGE_SIZE: usize = 64;

/// Largest page size accepted by [`StorageConfig::validate`].
///
/// Slot offsets and sizes are stored as u16, so every byte of a page must be
/// addressable with 16 bits.
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize + 1;

/// Sizing knobs handed to the page manager, the buffer pool and the
/// database file at construction time.
///
/// All multi-byte integers on disk are big-endian regardless of config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Size of every page in bytes.
    pub page_size: usize,
    /// Maximum number of resident pages in the buffer pool.
    pub cache_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Checks that the page size fits the on-disk slot format and that the
    /// pool can hold at least one page.
    pub fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(StorageError::PageTooSmall {
                size: self.page_size,
                minimum: MIN_PAGE_SIZE,
            });
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(StorageError::InvalidPageSize {
                expected: MAX_PAGE_SIZE,
                actual: self.page_size,
            });
        }
        if self.cache_size == 0 {
            return Err(StorageError::InvalidConfig(
                "cache size must be at least one page".to_string(),
            ));
        }
        Ok(())
    }
}
