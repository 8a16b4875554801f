use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::common::{PageId, Result, StorageError};
use crate::storage::page::Page;

use super::{LruReplacer, SecondaryStorage};

/// BufferPool caches up to `capacity` pages in memory in front of a
/// [`SecondaryStorage`]. Pinned pages are never evicted; unpinned pages are
/// evicted least recently used first and written back only when dirty.
///
/// The pool has a single writer. Callers that share it across threads wrap
/// the whole pool in one lock.
pub struct BufferPool<S: SecondaryStorage> {
    /// Maximum number of resident pages
    capacity: usize,
    /// Where pages are loaded from and written back to
    storage: S,
    /// Resident pages
    pages: HashMap<PageId, Page>,
    /// Recency order and pin set
    replacer: LruReplacer,
    /// Pages that must never be cached
    reserved: HashSet<PageId>,
    closed: bool,
}

impl<S: SecondaryStorage> BufferPool<S> {
    /// Creates a new BufferPool holding at most `capacity` pages.
    pub fn new(capacity: usize, storage: S) -> Self {
        Self {
            capacity,
            storage,
            pages: HashMap::with_capacity(capacity),
            replacer: LruReplacer::new(),
            reserved: HashSet::new(),
            closed: false,
        }
    }

    /// Excludes `page_id` from the pool. Fetching it afterwards fails with
    /// `ReservedPage`; a resident copy is dropped without write-back.
    pub fn reserve(&mut self, page_id: PageId) {
        self.reserved.insert(page_id);
        self.pages.remove(&page_id);
        self.replacer.remove(page_id);
    }

    pub fn is_reserved(&self, page_id: PageId) -> bool {
        self.reserved.contains(&page_id)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::AlreadyClosed);
        }
        Ok(())
    }

    /// Pins a page and returns it, loading it from storage on a miss.
    ///
    /// When the pool is full the least recently used unpinned page is
    /// evicted first. If every resident page is pinned the call fails with
    /// `CacheExhausted` and nothing is evicted.
    pub fn fetch_and_pin(&mut self, page_id: PageId) -> Result<&mut Page> {
        self.check_open()?;
        if self.reserved.contains(&page_id) {
            return Err(StorageError::ReservedPage(page_id));
        }

        // Pin before loading so the page cannot be chosen as a victim while
        // room is being made for it.
        let newly_pinned = self.replacer.pin(page_id);

        if !self.pages.contains_key(&page_id) {
            let loaded = self
                .make_room()
                .and_then(|()| self.storage.read_page(page_id));
            match loaded {
                Ok(page) => {
                    self.pages.insert(page_id, page);
                }
                Err(err) => {
                    if newly_pinned {
                        self.replacer.unpin(page_id);
                    }
                    return Err(err);
                }
            }
        }

        self.replacer.record_access(page_id);
        self.pages
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))
    }

    /// Frees one resident slot if the pool is at capacity.
    fn make_room(&mut self) -> Result<()> {
        if self.pages.len() < self.capacity {
            return Ok(());
        }
        let victim = self.replacer.victim().ok_or(StorageError::CacheExhausted {
            capacity: self.capacity,
        })?;
        self.evict(victim)
    }

    fn evict(&mut self, page_id: PageId) -> Result<()> {
        if let Some(page) = self.pages.get(&page_id) {
            if page.is_dirty() {
                self.storage.write_page(page)?;
                trace!(%page_id, "wrote back dirty page");
            }
        }
        self.pages.remove(&page_id);
        self.replacer.remove(page_id);

        debug!(%page_id, "evicted page");
        Ok(())
    }

    /// Makes a page evictable again. Unpinning an unpinned or non-resident
    /// page does nothing.
    pub fn unpin(&mut self, page_id: PageId) {
        self.replacer.unpin(page_id);
    }

    /// Writes a resident page to storage and clears its dirty flag.
    /// Returns false if the page is not resident.
    pub fn flush(&mut self, page_id: PageId) -> Result<bool> {
        self.check_open()?;

        match self.pages.get_mut(&page_id) {
            Some(page) => {
                self.storage.write_page(page)?;
                page.set_dirty(false);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes back every dirty resident page.
    pub fn flush_all(&mut self) -> Result<()> {
        self.check_open()?;

        for page in self.pages.values_mut() {
            if page.is_dirty() {
                self.storage.write_page(page)?;
                page.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Writes back dirty pages and drops all pool bookkeeping. The storage
    /// itself is left open.
    pub fn close(&mut self) -> Result<()> {
        self.flush_all()?;
        self.pages.clear();
        self.replacer.clear();
        self.closed = true;
        Ok(())
    }

    /// Marks a resident page dirty.
    pub fn mark_dirty(&mut self, page_id: PageId) -> Result<()> {
        let page = self
            .pages
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;
        page.set_dirty(true);
        Ok(())
    }

    /// Returns a resident page without touching recency.
    pub fn page(&self, page_id: PageId) -> Option<&Page> {
        self.pages.get(&page_id)
    }

    /// Returns a resident page for mutation without touching recency.
    pub fn page_mut(&mut self, page_id: PageId) -> Option<&mut Page> {
        self.pages.get_mut(&page_id)
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn is_pinned(&self, page_id: PageId) -> bool {
        self.replacer.is_pinned(page_id)
    }

    /// Resident page ids, most recently used first.
    pub fn resident_pages(&self) -> Vec<PageId> {
        self.replacer.order().collect()
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}
