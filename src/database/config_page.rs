use crate::common::{PageId, Result, StorageError};
use crate::storage::page::Cell;

use super::DatabaseFile;

/// String settings stored as record cells in the database's config page.
///
/// Writes only dirty the cached page; they reach disk through the buffer
/// pool's write-back (eviction, flush or close).
pub struct Config<'a> {
    db: &'a DatabaseFile,
    page_id: PageId,
}

impl<'a> Config<'a> {
    pub(crate) fn new(db: &'a DatabaseFile, page_id: PageId) -> Self {
        Self { db, page_id }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        let cell = self
            .db
            .with_pinned_page(self.page_id, |page| page.cell(key.as_bytes()))?;
        match cell {
            Some(Cell::Record { value, .. }) => String::from_utf8(value)
                .map(Some)
                .map_err(|e| StorageError::CorruptCell(format!("config value {:?}: {}", key, e))),
            Some(Cell::Pointer { .. }) => Err(StorageError::CorruptCell(format!(
                "config key {:?} holds a pointer",
                key
            ))),
            None => Ok(None),
        }
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.db.with_pinned_page(self.page_id, |page| {
            page.put_record_cell(key.as_bytes(), value.as_bytes())
        })
    }
}
