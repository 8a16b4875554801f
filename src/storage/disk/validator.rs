use crate::common::{Result, StorageError};

use super::HostFile;

/// Checks that a host file can be opened as a page file.
pub trait Validator {
    fn validate(&self, file: &dyn HostFile, page_size: usize) -> Result<()>;
}

/// Accepts regular files whose length is a whole number of pages, with at
/// least `min_pages` pages present.
#[derive(Debug, Clone, Copy)]
pub struct LayoutValidator {
    pub min_pages: u64,
}

impl Default for LayoutValidator {
    /// Header page plus tables page.
    fn default() -> Self {
        Self { min_pages: 2 }
    }
}

impl Validator for LayoutValidator {
    fn validate(&self, file: &dyn HostFile, page_size: usize) -> Result<()> {
        if !file.is_regular_file()? {
            return Err(StorageError::InvalidDatabaseFile(
                "not a regular file".to_string(),
            ));
        }

        let size = file.size()?;
        if size % page_size as u64 != 0 {
            return Err(StorageError::InvalidDatabaseFile(format!(
                "file size {} is not a multiple of the page size {}",
                size, page_size
            )));
        }

        let pages = size / page_size as u64;
        if pages < self.min_pages {
            return Err(StorageError::InvalidDatabaseFile(format!(
                "file holds {} pages, expected at least {}",
                pages, self.min_pages
            )));
        }
        Ok(())
    }
}
