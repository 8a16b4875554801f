use std::sync::Arc;

use crate::common::{PageId, Result};
use crate::storage::page::Page;

/// Where the buffer pool loads pages from and writes them back to.
pub trait SecondaryStorage {
    fn read_page(&self, page_id: PageId) -> Result<Page>;

    fn write_page(&self, page: &Page) -> Result<()>;
}

impl<T: SecondaryStorage + ?Sized> SecondaryStorage for Arc<T> {
    fn read_page(&self, page_id: PageId) -> Result<Page> {
        (**self).read_page(page_id)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        (**self).write_page(page)
    }
}

impl<T: SecondaryStorage + ?Sized> SecondaryStorage for &T {
    fn read_page(&self, page_id: PageId) -> Result<Page> {
        (**self).read_page(page_id)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        (**self).write_page(page)
    }
}
