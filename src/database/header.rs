use crate::common::{PageId, Result, StorageError};
use crate::storage::page::{Cell, Page};

/// Key of the record holding the number of allocated pages.
pub const PAGE_COUNT_KEY: &[u8] = b"pageCount";

/// Key of the pointer to the tables page.
pub const TABLES_KEY: &[u8] = b"tables";

/// Key of the pointer to the config page, present once config is used.
pub const CONFIG_KEY: &[u8] = b"config";

/// The database header page (page 0).
///
/// Holds database-wide bookkeeping as ordinary cells: an 8-byte big-endian
/// page count record and pointers to the tables page and, optionally, the
/// config page.
#[derive(Debug)]
pub struct HeaderPage {
    page: Page,
}

impl HeaderPage {
    /// Populates a freshly allocated page 0.
    pub fn init(mut page: Page, tables: PageId, page_count: u64) -> Result<Self> {
        page.store_record_cell(PAGE_COUNT_KEY, &page_count.to_be_bytes())?;
        page.store_pointer_cell(TABLES_KEY, tables)?;
        Ok(Self { page })
    }

    /// Wraps a header page read from disk after checking its required cells.
    pub fn load(page: Page) -> Result<Self> {
        if page.id() != PageId::HEADER {
            return Err(StorageError::InvalidDatabaseFile(format!(
                "header must be page 0, got {}",
                page.id()
            )));
        }
        let header = Self { page };
        header.page_count()?;
        header.tables_page_id()?;
        Ok(header)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_count(&self) -> Result<u64> {
        match self.page.cell(PAGE_COUNT_KEY)? {
            Some(Cell::Record { value, .. }) => {
                let bytes: [u8; 8] = value.as_slice().try_into().map_err(|_| {
                    StorageError::InvalidDatabaseFile(format!(
                        "page count record is {} bytes, expected 8",
                        value.len()
                    ))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            _ => Err(missing("page count record")),
        }
    }

    pub fn set_page_count(&mut self, count: u64) -> Result<()> {
        self.page.put_record_cell(PAGE_COUNT_KEY, &count.to_be_bytes())
    }

    /// Adds one to the page count and returns the new value.
    pub fn increment_page_count(&mut self) -> Result<u64> {
        let count = self.page_count()? + 1;
        self.set_page_count(count)?;
        Ok(count)
    }

    pub fn tables_page_id(&self) -> Result<PageId> {
        self.pointer(TABLES_KEY)?
            .ok_or_else(|| missing("tables pointer"))
    }

    pub fn config_page_id(&self) -> Result<Option<PageId>> {
        self.pointer(CONFIG_KEY)
    }

    /// Fails with `PageFull` if the config pointer would not fit.
    pub fn check_room_for_config(&self) -> Result<()> {
        self.page
            .check_room(Cell::pointer(CONFIG_KEY, PageId::HEADER).encoded_len())
    }

    pub fn set_config_page_id(&mut self, page_id: PageId) -> Result<()> {
        self.page.store_pointer_cell(CONFIG_KEY, page_id)
    }

    fn pointer(&self, key: &[u8]) -> Result<Option<PageId>> {
        match self.page.cell(key)? {
            Some(Cell::Pointer { target, .. }) => Ok(Some(target)),
            Some(Cell::Record { .. }) => Err(StorageError::InvalidDatabaseFile(format!(
                "header cell {:?} is not a pointer",
                String::from_utf8_lossy(key)
            ))),
            None => Ok(None),
        }
    }
}

fn missing(what: &str) -> StorageError {
    StorageError::InvalidDatabaseFile(format!("header page has no {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> HeaderPage {
        HeaderPage::init(Page::new(PageId::HEADER, 256), PageId::new(1), 2).unwrap()
    }

    #[test]
    fn test_init_layout() {
        let header = header();
        assert_eq!(header.page_count().unwrap(), 2);
        assert_eq!(header.tables_page_id().unwrap(), PageId::new(1));
        assert_eq!(header.config_page_id().unwrap(), None);

        let cells = header.page().cells().unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::record(PAGE_COUNT_KEY, 2u64.to_be_bytes().to_vec()),
                Cell::pointer(TABLES_KEY, PageId::new(1)),
            ]
        );
    }

    #[test]
    fn test_increment_page_count() {
        let mut header = header();
        assert_eq!(header.increment_page_count().unwrap(), 3);
        assert_eq!(header.increment_page_count().unwrap(), 4);
        assert_eq!(header.page_count().unwrap(), 4);
        assert_eq!(header.page().cell_count(), 2);
    }

    #[test]
    fn test_config_pointer() {
        let mut header = header();
        header.set_config_page_id(PageId::new(5)).unwrap();
        assert_eq!(header.config_page_id().unwrap(), Some(PageId::new(5)));
    }

    #[test]
    fn test_load_rejects_missing_cells() {
        let page = Page::new(PageId::HEADER, 256);
        assert!(matches!(
            HeaderPage::load(page),
            Err(StorageError::InvalidDatabaseFile(_))
        ));

        let mut page = Page::new(PageId::HEADER, 256);
        page.store_record_cell(PAGE_COUNT_KEY, &[0, 1]).unwrap();
        page.store_pointer_cell(TABLES_KEY, PageId::new(1)).unwrap();
        assert!(HeaderPage::load(page).is_err());
    }

    #[test]
    fn test_load_rejects_wrong_page() {
        let page = header().page().clone();
        assert!(HeaderPage::load(page).is_ok());

        let other = Page::new(PageId::new(3), 256);
        assert!(HeaderPage::load(other).is_err());
    }
}
