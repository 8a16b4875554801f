use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::SecondaryStorage;
use crate::common::{PageId, Result, StorageError};
use crate::storage::page::Page;

use super::HostFile;

/// PageManager is responsible for reading and writing pages to/from a host
/// file. Page `id` lives at byte offset `id * page_size`; ids are handed out
/// monotonically starting from the number of pages already in the file.
pub struct PageManager {
    /// The backing file, `None` once closed
    file: Mutex<Option<Box<dyn HostFile>>>,
    /// Size of every page in bytes
    page_size: usize,
    /// Next page id to hand out
    next_page_id: AtomicU32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl PageManager {
    /// Creates a PageManager over an already opened host file.
    pub fn new(file: Box<dyn HostFile>, page_size: usize) -> Result<Self> {
        let file_size = file.size()?;
        let num_pages = (file_size / page_size as u64) as u32;

        Ok(Self {
            file: Mutex::new(Some(file)),
            page_size,
            next_page_id: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Opens (creating if needed) a plain file at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::new(Box::new(file), page_size)
    }

    fn with_file<R>(
        &self,
        page_id: PageId,
        op: impl FnOnce(&mut dyn HostFile) -> io::Result<R>,
    ) -> Result<R> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StorageError::AlreadyClosed)?;
        op(&mut **file).map_err(|source| StorageError::PageIo { page_id, source })
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        let offset = page_id.file_offset(self.page_size);
        let mut data = vec![0u8; self.page_size];
        self.with_file(page_id, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut data)
        })?;
        self.num_reads.fetch_add(1, Ordering::Relaxed);

        let page = Page::from_bytes(data, self.page_size)?;
        if page.id() != page_id {
            return Err(StorageError::PageIdMismatch {
                expected: page_id,
                found: page.id(),
            });
        }
        Ok(page)
    }

    /// Writes a page to disk and syncs the file before returning.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        if page.page_size() != self.page_size {
            return Err(StorageError::InvalidPageSize {
                expected: self.page_size,
                actual: page.page_size(),
            });
        }

        let page_id = page.id();
        let offset = page_id.file_offset(self.page_size);
        self.with_file(page_id, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(page.as_bytes())?;
            file.sync_all()
        })?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "wrote page");
        Ok(())
    }

    /// Allocates a new empty page on disk and returns it.
    pub fn allocate_new(&self) -> Result<Page> {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));
        let page = Page::new(page_id, self.page_size);
        self.write_page(&page)?;

        debug!(%page_id, "allocated page");
        Ok(page)
    }

    /// Returns the number of pages currently allocated.
    pub fn num_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::SeqCst)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of page reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(StorageError::AlreadyClosed)?;
        file.sync_all()?;
        Ok(())
    }

    /// Syncs and releases the backing file.
    pub fn close(&self) -> Result<()> {
        let mut file = self.file.lock().take().ok_or(StorageError::AlreadyClosed)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }
}

impl SecondaryStorage for PageManager {
    fn read_page(&self, page_id: PageId) -> Result<Page> {
        PageManager::read_page(self, page_id)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        PageManager::write_page(self, page)
    }
}

impl Drop for PageManager {
    fn drop(&mut self) {
        if let Some(file) = self.file.get_mut() {
            let _ = file.sync_all();
        }
    }
}
