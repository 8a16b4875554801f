use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::buffer::BufferPool;
use crate::common::{PageId, Result, StorageConfig, StorageError};
use crate::storage::disk::{HostFile, LayoutValidator, PageManager, Validator};
use crate::storage::page::Page;

use super::{Config, HeaderPage};

/// The buffer pool type a [`DatabaseFile`] caches its pages in.
pub type DatabasePool = BufferPool<Arc<PageManager>>;

/// A page file with a header page, a tables page and a buffer pool.
///
/// Page 0 is the header and is always read and written directly through the
/// page manager. Every other page is accessed through the buffer pool.
pub struct DatabaseFile {
    config: StorageConfig,
    page_manager: Arc<PageManager>,
    buffer_pool: Mutex<DatabasePool>,
    header: Mutex<HeaderPage>,
    closed: AtomicBool,
}

impl DatabaseFile {
    /// Initializes a new database in `file`, discarding its previous
    /// contents.
    pub fn create(mut file: Box<dyn HostFile>, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        if !file.is_regular_file()? {
            return Err(StorageError::InvalidDatabaseFile(
                "not a regular file".to_string(),
            ));
        }
        file.set_len(0)?;

        let page_manager = Arc::new(PageManager::new(file, config.page_size)?);
        let header = page_manager.allocate_new()?;
        let tables = page_manager.allocate_new()?;

        let header = HeaderPage::init(header, tables.id(), 2)?;
        page_manager.write_page(header.page())?;
        page_manager.write_page(&tables)?;

        debug!(
            page_size = config.page_size,
            cache_size = config.cache_size,
            "created database file"
        );
        Ok(Self::assemble(config, page_manager, header))
    }

    /// Opens an existing database, checking its layout with the default
    /// [`LayoutValidator`].
    pub fn open(file: Box<dyn HostFile>, config: StorageConfig) -> Result<Self> {
        Self::open_with_validator(file, config, &LayoutValidator::default())
    }

    pub fn open_with_validator(
        file: Box<dyn HostFile>,
        config: StorageConfig,
        validator: &dyn Validator,
    ) -> Result<Self> {
        config.validate()?;
        validator.validate(file.as_ref(), config.page_size)?;

        let page_manager = Arc::new(PageManager::new(file, config.page_size)?);
        let header = HeaderPage::load(page_manager.read_page(PageId::HEADER)?)?;

        let recorded = header.page_count()?;
        let on_disk = u64::from(page_manager.num_pages());
        if recorded != on_disk {
            warn!(recorded, on_disk, "header page count disagrees with file length");
        }

        debug!(pages = on_disk, "opened database file");
        Ok(Self::assemble(config, page_manager, header))
    }

    /// Creates (or truncates) the file at `path` and initializes a database
    /// in it.
    pub fn create_path<P: AsRef<Path>>(path: P, config: StorageConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::create(Box::new(file), config)
    }

    pub fn open_path<P: AsRef<Path>>(path: P, config: StorageConfig) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::open(Box::new(file), config)
    }

    fn assemble(config: StorageConfig, page_manager: Arc<PageManager>, header: HeaderPage) -> Self {
        let mut buffer_pool = BufferPool::new(config.cache_size, Arc::clone(&page_manager));
        buffer_pool.reserve(PageId::HEADER);
        Self {
            config,
            page_manager,
            buffer_pool: Mutex::new(buffer_pool),
            header: Mutex::new(header),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::AlreadyClosed);
        }
        Ok(())
    }

    /// Allocates a fresh page and records it in the header's page count.
    pub fn allocate_new_page(&self) -> Result<PageId> {
        self.check_open()?;
        let mut header = self.header.lock();
        self.allocate_locked(&mut header)
    }

    fn allocate_locked(&self, header: &mut HeaderPage) -> Result<PageId> {
        let page_id = self.page_manager.allocate_new()?.id();
        header.increment_page_count()?;
        self.page_manager.write_page(header.page())?;
        Ok(page_id)
    }

    /// Number of pages recorded in the header, header and tables included.
    pub fn page_count(&self) -> Result<u64> {
        self.check_open()?;
        self.header.lock().page_count()
    }

    pub fn tables_page_id(&self) -> Result<PageId> {
        self.check_open()?;
        self.header.lock().tables_page_id()
    }

    /// Returns the config accessor, allocating the config page on first use.
    pub fn config(&self) -> Result<Config<'_>> {
        self.check_open()?;
        let mut header = self.header.lock();
        let page_id = match header.config_page_id()? {
            Some(page_id) => page_id,
            None => {
                header.check_room_for_config()?;
                let page_id = self.page_manager.allocate_new()?.id();
                header.set_config_page_id(page_id)?;
                header.increment_page_count()?;
                self.page_manager.write_page(header.page())?;
                debug!(%page_id, "allocated config page");
                page_id
            }
        };
        Ok(Config::new(self, page_id))
    }

    /// Pins `page_id` in the buffer pool for the duration of `f`.
    ///
    /// A page the caller had already pinned stays pinned afterwards.
    pub fn with_pinned_page<R>(
        &self,
        page_id: PageId,
        f: impl FnOnce(&mut Page) -> Result<R>,
    ) -> Result<R> {
        self.check_open()?;
        if page_id == PageId::HEADER {
            return Err(StorageError::ReservedPage(page_id));
        }

        let mut pool = self.buffer_pool.lock();
        let was_pinned = pool.is_pinned(page_id);
        let result = pool.fetch_and_pin(page_id).and_then(f);
        if !was_pinned {
            pool.unpin(page_id);
        }
        result
    }

    /// Locks the buffer pool for direct use. The header page is reserved and
    /// cannot be fetched through it.
    pub fn buffer_pool(&self) -> Result<MutexGuard<'_, DatabasePool>> {
        self.check_open()?;
        Ok(self.buffer_pool.lock())
    }

    pub fn page_manager(&self) -> &PageManager {
        &self.page_manager
    }

    pub fn storage_config(&self) -> StorageConfig {
        self.config
    }

    /// Flushes dirty pages and closes the backing file.
    ///
    /// The database only counts as closed once both steps succeed, so a
    /// failed close can be retried.
    pub fn close(&self) -> Result<()> {
        let mut pool = self.buffer_pool.lock();
        self.check_open()?;

        if !pool.is_closed() {
            pool.close()?;
        }
        if !self.page_manager.is_closed() {
            self.page_manager.close()?;
        }
        self.closed.store(true, Ordering::SeqCst);

        debug!("closed database file");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for DatabaseFile {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(err) = self.close() {
                warn!(%err, "failed to close database file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MIN_PAGE_SIZE;
    use crate::storage::disk::MemoryFile;
    use crate::storage::page::Cell;
    use std::io::{self, Read, Seek, SeekFrom, Write};

    /// A memory file whose writes can be switched to fail.
    struct FlakyFile {
        inner: MemoryFile,
        fail_writes: Arc<AtomicBool>,
    }

    impl Read for FlakyFile {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "write refused"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FlakyFile {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl HostFile for FlakyFile {
        fn size(&self) -> io::Result<u64> {
            self.inner.size()
        }

        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.inner.set_len(len)
        }

        fn sync_all(&mut self) -> io::Result<()> {
            self.inner.sync_all()
        }
    }

    fn test_config() -> StorageConfig {
        StorageConfig::default()
            .with_page_size(256)
            .with_cache_size(4)
    }

    fn create() -> (DatabaseFile, MemoryFile) {
        let file = MemoryFile::new();
        let db = DatabaseFile::create(Box::new(file.clone()), test_config()).unwrap();
        (db, file)
    }

    #[test]
    fn test_create_layout() {
        let (db, file) = create();
        assert_eq!(db.page_count().unwrap(), 2);
        assert_eq!(db.tables_page_id().unwrap(), PageId::new(1));
        assert_eq!(db.page_manager().num_pages(), 2);
        assert_eq!(file.to_bytes().len(), 2 * 256);
    }

    #[test]
    fn test_create_truncates_existing_contents() {
        let file = MemoryFile::from_bytes(vec![0xAB; 256 * 5]);
        let db = DatabaseFile::create(Box::new(file.clone()), test_config()).unwrap();
        assert_eq!(db.page_count().unwrap(), 2);
        assert_eq!(file.to_bytes().len(), 2 * 256);
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let config = test_config().with_page_size(16);
        assert!(matches!(
            DatabaseFile::create(Box::new(MemoryFile::new()), config),
            Err(StorageError::PageTooSmall { .. })
        ));
    }

    #[test]
    fn test_allocate_updates_header() {
        let (db, file) = create();
        assert_eq!(db.allocate_new_page().unwrap(), PageId::new(2));
        assert_eq!(db.allocate_new_page().unwrap(), PageId::new(3));
        assert_eq!(db.page_count().unwrap(), 4);

        // The header on disk reflects the allocation without a close.
        let on_disk = Page::from_bytes(file.to_bytes()[..256].to_vec(), 256).unwrap();
        let header = HeaderPage::load(on_disk).unwrap();
        assert_eq!(header.page_count().unwrap(), 4);
    }

    #[test]
    fn test_with_pinned_page_rejects_header() {
        let (db, _file) = create();
        assert!(matches!(
            db.with_pinned_page(PageId::HEADER, |_| Ok(())),
            Err(StorageError::ReservedPage(_))
        ));
    }

    #[test]
    fn test_with_pinned_page_unpins() {
        let (db, _file) = create();
        let page_id = db.allocate_new_page().unwrap();
        db.with_pinned_page(page_id, |page| page.store_record_cell(b"k", b"v"))
            .unwrap();

        let pool = db.buffer_pool().unwrap();
        assert!(pool.is_resident(page_id));
        assert!(!pool.is_pinned(page_id));
        assert!(pool.page(page_id).unwrap().is_dirty());
    }

    #[test]
    fn test_with_pinned_page_keeps_caller_pin() {
        let (db, _file) = create();
        let page_id = db.allocate_new_page().unwrap();
        db.buffer_pool().unwrap().fetch_and_pin(page_id).unwrap();

        let count = db
            .with_pinned_page(page_id, |page| Ok(page.cell_count()))
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.buffer_pool().unwrap().is_pinned(page_id));
    }

    #[test]
    fn test_config_page_allocated_once() {
        let (db, _file) = create();
        let first = db.config().unwrap().page_id();
        let second = db.config().unwrap().page_id();
        assert_eq!(first, PageId::new(2));
        assert_eq!(first, second);
        assert_eq!(db.page_count().unwrap(), 3);
    }

    #[test]
    fn test_config_strings() {
        let (db, _file) = create();
        let config = db.config().unwrap();
        assert_eq!(config.get_string("name").unwrap(), None);

        config.set_string("name", "celldb").unwrap();
        config.set_string("name", "renamed").unwrap();
        assert_eq!(config.get_string("name").unwrap(), Some("renamed".to_string()));
    }

    #[test]
    fn test_config_rejects_pointer_value() {
        let (db, _file) = create();
        let page_id = db.config().unwrap().page_id();
        db.with_pinned_page(page_id, |page| {
            page.store_cell(&Cell::pointer(b"link".to_vec(), PageId::new(1)))
        })
        .unwrap();

        assert!(matches!(
            db.config().unwrap().get_string("link"),
            Err(StorageError::CorruptCell(_))
        ));
    }

    #[test]
    fn test_close_then_reopen() {
        let (db, file) = create();
        let page_id = db.allocate_new_page().unwrap();
        db.with_pinned_page(page_id, |page| page.store_record_cell(b"k", b"v"))
            .unwrap();
        db.config().unwrap().set_string("mode", "test").unwrap();
        db.close().unwrap();

        assert!(db.is_closed());
        assert!(matches!(db.close(), Err(StorageError::AlreadyClosed)));
        assert!(matches!(db.allocate_new_page(), Err(StorageError::AlreadyClosed)));
        assert!(db.config().is_err());

        let db = DatabaseFile::open(Box::new(file), test_config()).unwrap();
        assert_eq!(db.page_count().unwrap(), 4);
        let cell = db.with_pinned_page(page_id, |page| page.cell(b"k")).unwrap();
        assert_eq!(cell, Some(Cell::record(b"k".to_vec(), b"v".to_vec())));
        assert_eq!(
            db.config().unwrap().get_string("mode").unwrap(),
            Some("test".to_string())
        );
    }

    #[test]
    fn test_open_rejects_missing_header_cells() {
        let file = MemoryFile::new();
        {
            let pm = PageManager::new(Box::new(file.clone()), 256).unwrap();
            pm.allocate_new().unwrap();
            pm.allocate_new().unwrap();
        }
        assert!(matches!(
            DatabaseFile::open(Box::new(file), test_config()),
            Err(StorageError::InvalidDatabaseFile(_))
        ));
    }

    #[test]
    fn test_open_rejects_short_file() {
        let file = MemoryFile::from_bytes(vec![0; 256]);
        assert!(matches!(
            DatabaseFile::open(Box::new(file), test_config()),
            Err(StorageError::InvalidDatabaseFile(_))
        ));
    }

    #[test]
    fn test_header_not_reachable_through_pool() {
        let (db, file) = create();
        assert!(matches!(
            db.buffer_pool().unwrap().fetch_and_pin(PageId::HEADER),
            Err(StorageError::ReservedPage(_))
        ));

        db.allocate_new_page().unwrap();
        db.allocate_new_page().unwrap();
        db.close().unwrap();

        let db = DatabaseFile::open(Box::new(file), test_config()).unwrap();
        assert_eq!(db.page_count().unwrap(), 4);
    }

    #[test]
    fn test_failed_close_can_be_retried() {
        let inner = MemoryFile::new();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let file = FlakyFile {
            inner: inner.clone(),
            fail_writes: Arc::clone(&fail_writes),
        };
        let db = DatabaseFile::create(Box::new(file), test_config()).unwrap();
        let page_id = db.allocate_new_page().unwrap();
        db.with_pinned_page(page_id, |page| page.store_record_cell(b"k", b"v"))
            .unwrap();

        fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(db.close(), Err(StorageError::PageIo { .. })));
        assert!(!db.is_closed());
        assert!(db.page_count().is_ok());

        fail_writes.store(false, Ordering::SeqCst);
        db.close().unwrap();
        assert!(db.is_closed());

        let db = DatabaseFile::open(Box::new(inner), test_config()).unwrap();
        let cell = db.with_pinned_page(page_id, |page| page.cell(b"k")).unwrap();
        assert_eq!(cell, Some(Cell::record(b"k".to_vec(), b"v".to_vec())));
    }

    #[test]
    fn test_config_on_full_header_allocates_nothing() {
        let config = test_config().with_page_size(MIN_PAGE_SIZE);
        let db = DatabaseFile::create(Box::new(MemoryFile::new()), config).unwrap();

        for _ in 0..3 {
            assert!(matches!(db.config(), Err(StorageError::PageFull { .. })));
        }
        assert_eq!(db.page_count().unwrap(), 2);
        assert_eq!(db.page_manager().num_pages(), 2);

        // Plain allocation still fits: the page count record keeps its size.
        assert_eq!(db.allocate_new_page().unwrap(), PageId::new(2));
        assert_eq!(db.page_count().unwrap(), 3);
    }
}
