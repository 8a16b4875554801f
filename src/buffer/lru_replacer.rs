use std::collections::{HashSet, VecDeque};

use crate::common::PageId;

/// LRU replacement policy over resident pages.
///
/// Keeps every resident page exactly once in recency order (most recent at
/// the front) and a set of pinned pages. The victim is the least recently
/// used page that is not pinned.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Resident pages, most recently used first
    order: VecDeque<PageId>,
    /// Pages excluded from eviction
    pinned: HashSet<PageId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `page_id` as the most recently used page, adding it if absent.
    pub fn record_access(&mut self, page_id: PageId) {
        if let Some(pos) = self.order.iter().position(|&id| id == page_id) {
            self.order.remove(pos);
        }
        self.order.push_front(page_id);
    }

    /// Pins a page. Returns false if it was already pinned.
    pub fn pin(&mut self, page_id: PageId) -> bool {
        self.pinned.insert(page_id)
    }

    /// Unpins a page. Unpinning an unpinned or unknown page does nothing.
    pub fn unpin(&mut self, page_id: PageId) {
        self.pinned.remove(&page_id);
    }

    pub fn is_pinned(&self, page_id: PageId) -> bool {
        self.pinned.contains(&page_id)
    }

    /// Returns the least recently used unpinned page without removing it.
    pub fn victim(&self) -> Option<PageId> {
        self.order
            .iter()
            .rev()
            .find(|&&id| !self.pinned.contains(&id))
            .copied()
    }

    /// Forgets a page entirely.
    pub fn remove(&mut self, page_id: PageId) {
        if let Some(pos) = self.order.iter().position(|&id| id == page_id) {
            self.order.remove(pos);
        }
        self.pinned.remove(&page_id);
    }

    /// Pages in recency order, most recent first.
    pub fn order(&self) -> impl Iterator<Item = PageId> + '_ {
        self.order.iter().copied()
    }

    /// Number of tracked pages.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.pinned.clear();
    }
}
