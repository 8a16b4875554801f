use std::cmp::Ordering;

use tracing::trace;

use crate::common::{PageId, Result, StorageError};

use super::cell::{decode_key, Cell};

/// Slotted page layout (all integers big-endian):
///
/// +------------------+
/// | Page Header      |  page id u32, cell count u16
/// +------------------+
/// | Slot Directory   |  sorted by cell key, grows toward the end
/// | [slot 0]         |
/// | [slot 1]         |
/// | [reserved]       |  room for the next insert
/// +------------------+
/// |                  |
/// | Free Space       |
/// |                  |
/// +------------------+
/// | Cell Data        |  carved from the end of free gaps
/// | ...              |
/// +------------------+
///
/// Each slot entry is an offset u16 followed by a size u16.
pub const HEADER_SIZE: usize = 6;

/// Size of each slot entry in bytes
pub const SLOT_SIZE: usize = 4;

/// Offset of page_id field in header
const PAGE_ID_OFFSET: usize = 0;

/// Offset of cell_count field in header
const CELL_COUNT_OFFSET: usize = 4;

/// A byte range inside a page, either holding one encoded cell or free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: u16,
    pub size: u16,
}

impl Slot {
    pub fn new(offset: u16, size: u16) -> Self {
        Self { offset, size }
    }

    fn span(start: usize, end: usize) -> Self {
        Self::new(start as u16, (end - start) as u16)
    }

    pub fn start(&self) -> usize {
        self.offset as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.size as usize
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Moves `size` bytes from `offset` to `target` with memmove semantics and
/// zeroes the part of the source range the destination does not cover.
pub fn move_and_zero(buf: &mut [u8], offset: usize, size: usize, target: usize) {
    if size == 0 || offset == target {
        return;
    }
    buf.copy_within(offset..offset + size, target);

    let src_end = offset + size;
    let dst_end = target + size;
    if dst_end <= offset || target >= src_end {
        buf[offset..src_end].fill(0);
    } else if target > offset {
        buf[offset..target].fill(0);
    } else {
        buf[dst_end..src_end].fill(0);
    }
}

/// One fixed-size page of key-ordered cells.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    dirty: bool,
    data: Vec<u8>,
}

impl Page {
    /// Creates an empty page. `page_size` must already be validated by
    /// [`crate::common::StorageConfig::validate`].
    pub fn new(id: PageId, page_size: usize) -> Self {
        let mut page = Self {
            id,
            dirty: false,
            data: vec![0; page_size],
        };
        page.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4].copy_from_slice(&id.as_u32().to_be_bytes());
        page.set_cell_count(0);
        page
    }

    /// Loads a page from its raw bytes.
    pub fn from_bytes(data: Vec<u8>, page_size: usize) -> Result<Self> {
        let minimum = HEADER_SIZE + SLOT_SIZE;
        if data.len() < minimum {
            return Err(StorageError::PageTooSmall {
                size: data.len(),
                minimum,
            });
        }
        if data.len() != page_size {
            return Err(StorageError::InvalidPageSize {
                expected: page_size,
                actual: data.len(),
            });
        }

        let id = PageId::new(u32::from_be_bytes([
            data[PAGE_ID_OFFSET],
            data[PAGE_ID_OFFSET + 1],
            data[PAGE_ID_OFFSET + 2],
            data[PAGE_ID_OFFSET + 3],
        ]));
        let page = Self {
            id,
            dirty: false,
            data,
        };
        if page.reserved_end() > page.page_size() {
            return Err(page.corrupt(format!(
                "cell count {} overflows the page",
                page.cell_count()
            )));
        }

        // Cells must sit between the directory and the page end without
        // overlapping.
        let mut cells = page.slots();
        cells.sort_by_key(|slot| slot.offset);
        let mut previous_end = Self::slot_position(page.cell_count() as usize);
        for slot in cells {
            if slot.start() < previous_end || slot.end() > page.page_size() {
                return Err(page.corrupt(format!(
                    "slot {}..{} overlaps the directory or another cell, or exceeds the page",
                    slot.start(),
                    slot.end()
                )));
            }
            previous_end = slot.end();
        }
        Ok(page)
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Returns the number of live cells.
    pub fn cell_count(&self) -> u16 {
        self.read_u16(CELL_COUNT_OFFSET)
    }

    fn set_cell_count(&mut self, count: u16) {
        self.write_u16(CELL_COUNT_OFFSET, count);
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn slot_position(index: usize) -> usize {
        HEADER_SIZE + index * SLOT_SIZE
    }

    /// End of the slot directory including the entry reserved for the next
    /// insert.
    fn reserved_end(&self) -> usize {
        Self::slot_position(self.cell_count() as usize + 1)
    }

    /// Gets a slot entry by directory index.
    pub fn slot(&self, index: usize) -> Option<Slot> {
        if index >= self.cell_count() as usize {
            return None;
        }
        let pos = Self::slot_position(index);
        Some(Slot::new(self.read_u16(pos), self.read_u16(pos + 2)))
    }

    fn set_slot(&mut self, index: usize, slot: Slot) {
        let pos = Self::slot_position(index);
        self.write_u16(pos, slot.offset);
        self.write_u16(pos + 2, slot.size);
    }

    /// Slot directory in key order.
    pub fn slots(&self) -> Vec<Slot> {
        (0..self.cell_count() as usize)
            .filter_map(|i| self.slot(i))
            .collect()
    }

    fn corrupt(&self, reason: String) -> StorageError {
        StorageError::CorruptPage {
            page_id: self.id,
            reason,
        }
    }

    fn cell_bytes(&self, slot: Slot) -> Result<&[u8]> {
        if slot.start() < HEADER_SIZE || slot.end() > self.page_size() {
            return Err(self.corrupt(format!(
                "slot {}..{} lies outside the cell area",
                slot.start(),
                slot.end()
            )));
        }
        Ok(&self.data[slot.start()..slot.end()])
    }

    fn key_at(&self, index: usize) -> Result<&[u8]> {
        let slot = self
            .slot(index)
            .ok_or_else(|| self.corrupt(format!("missing slot {}", index)))?;
        decode_key(self.cell_bytes(slot)?)
    }

    /// Binary search over the directory. `Ok(i)` is the index holding `key`,
    /// `Err(i)` the index where it would be inserted.
    fn search(&self, key: &[u8]) -> Result<std::result::Result<usize, usize>> {
        let mut low = 0;
        let mut high = self.cell_count() as usize;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.key_at(mid)?.cmp(key) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(low))
    }

    pub fn store_record_cell(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.store_cell(&Cell::record(key, value))
    }

    pub fn store_pointer_cell(&mut self, key: &[u8], target: PageId) -> Result<()> {
        self.store_cell(&Cell::pointer(key, target))
    }

    /// Stores a cell into the smallest free slot that can hold it and links
    /// it into the directory at its key position.
    pub fn store_cell(&mut self, cell: &Cell) -> Result<()> {
        let position = match self.search(cell.key())? {
            Ok(_) => return Err(StorageError::DuplicateKey),
            Err(position) => position,
        };

        let size = cell.encoded_len();
        let free = self.slot_for_cell(size)?;
        let offset = free.end() - size;
        cell.encode_into(&mut &mut self.data[offset..offset + size]);

        let count = self.cell_count() as usize;
        move_and_zero(
            &mut self.data,
            Self::slot_position(position),
            (count - position) * SLOT_SIZE,
            Self::slot_position(position + 1),
        );
        self.set_slot(position, Slot::new(offset as u16, size as u16));
        self.set_cell_count(count as u16 + 1);
        self.dirty = true;

        trace!(page_id = %self.id, offset, size, position, "stored cell");
        Ok(())
    }

    /// Inserts or replaces a record cell. If the new record does not fit,
    /// the previous one is put back and `PageFull` is returned.
    pub fn put_record_cell(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let previous = self.cell(key)?;
        if previous.is_some() {
            self.delete_cell(key)?;
        }
        match self.store_record_cell(key, value) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(old) = previous {
                    self.store_cell(&old)?;
                }
                Err(err)
            }
        }
    }

    /// Looks up the cell stored under `key`.
    pub fn cell(&self, key: &[u8]) -> Result<Option<Cell>> {
        match self.search(key)? {
            Ok(index) => {
                let slot = self
                    .slot(index)
                    .ok_or_else(|| self.corrupt(format!("missing slot {}", index)))?;
                Ok(Some(Cell::decode(self.cell_bytes(slot)?)?))
            }
            Err(_) => Ok(None),
        }
    }

    /// All cells in ascending key order.
    pub fn cells(&self) -> Result<Vec<Cell>> {
        self.slots()
            .into_iter()
            .map(|slot| Cell::decode(self.cell_bytes(slot)?))
            .collect()
    }

    /// Removes the cell stored under `key`. Returns whether a cell was
    /// removed.
    pub fn delete_cell(&mut self, key: &[u8]) -> Result<bool> {
        let index = match self.search(key)? {
            Ok(index) => index,
            Err(_) => return Ok(false),
        };
        let slot = self
            .slot(index)
            .ok_or_else(|| self.corrupt(format!("missing slot {}", index)))?;

        self.data[slot.start()..slot.end()].fill(0);
        let count = self.cell_count() as usize;
        let entry = Self::slot_position(index);
        self.data[entry..entry + SLOT_SIZE].fill(0);
        move_and_zero(
            &mut self.data,
            Self::slot_position(index + 1),
            (count - index - 1) * SLOT_SIZE,
            entry,
        );
        self.set_cell_count(count as u16 - 1);
        self.dirty = true;
        Ok(true)
    }

    /// Splits free space into the leading gap (between the reserved slot
    /// entry and the lowest cell) and the gaps after each cell in offset
    /// order.
    fn gaps(&self) -> (Option<Slot>, Vec<Slot>) {
        let mut cells = self.slots();
        cells.sort_by_key(|slot| slot.offset);

        let page_size = self.page_size();
        let reserved_end = self.reserved_end();
        let first = cells.first().map(|slot| slot.start()).unwrap_or(page_size);
        let leading = (first > reserved_end).then(|| Slot::span(reserved_end, first));

        let mut rest = Vec::new();
        for (i, cell) in cells.iter().enumerate() {
            let next = cells.get(i + 1).map(|s| s.start()).unwrap_or(page_size);
            if next > cell.end() {
                rest.push(Slot::span(cell.end(), next));
            }
        }
        (leading, rest)
    }

    /// Free gaps in discovery order: the leading gap first, then the gaps
    /// following each cell by ascending offset.
    pub fn free_slots(&self) -> Vec<Slot> {
        let (leading, rest) = self.gaps();
        leading.into_iter().chain(rest).collect()
    }

    /// Total free bytes across all gaps.
    pub fn free_space(&self) -> usize {
        self.free_slots().iter().map(Slot::len).sum()
    }

    /// Best fit: the smallest free slot holding at least `size` bytes. Ties
    /// go to the slot discovered first.
    pub fn find_free_slot_for_size(&self, size: usize) -> Option<Slot> {
        let mut free = self.free_slots();
        free.sort_by_key(|slot| slot.size);
        free.into_iter().find(|slot| slot.len() >= size)
    }

    /// Checks that a cell of `size` encoded bytes could be stored without
    /// storing it.
    pub fn check_room(&self, size: usize) -> Result<()> {
        self.slot_for_cell(size).map(|_| ())
    }

    /// Best fit that also keeps room for the directory entry the insert
    /// adds: the leading gap must still hold one slot entry afterwards.
    fn slot_for_cell(&self, size: usize) -> Result<Slot> {
        let (leading, rest) = self.gaps();
        let leading_room = leading.map(|slot| slot.len()).unwrap_or(0);

        let mut candidates: Vec<(Slot, usize)> = Vec::new();
        if let Some(slot) = leading {
            candidates.push((slot, slot.len().saturating_sub(SLOT_SIZE)));
        }
        if leading_room >= SLOT_SIZE {
            candidates.extend(rest.into_iter().map(|slot| (slot, slot.len())));
        }
        candidates.sort_by_key(|(slot, _)| slot.size);

        candidates
            .iter()
            .find(|(_, usable)| *usable >= size)
            .map(|(slot, _)| *slot)
            .ok_or_else(|| StorageError::PageFull {
                required: size,
                available: candidates.iter().map(|(_, usable)| *usable).max().unwrap_or(0),
            })
    }

    /// Packs all cells against the end of the page. The directory keeps its
    /// order; only offsets change.
    pub fn defragment(&mut self) {
        let mut order: Vec<(usize, Slot)> = self.slots().into_iter().enumerate().collect();
        // Highest offset first, so each move only lands on bytes already
        // vacated or on the cell itself.
        order.sort_by(|a, b| b.1.offset.cmp(&a.1.offset));

        let mut write_end = self.page_size();
        let mut moved = false;
        for (index, slot) in order {
            let target = write_end - slot.len();
            if target != slot.start() {
                move_and_zero(&mut self.data, slot.start(), slot.len(), target);
                self.set_slot(index, Slot::new(target as u16, slot.size));
                moved = true;
            }
            write_end = target;
        }

        if moved {
            self.dirty = true;
        }
    }

    /// `1 - largest free slot / total free space`; 0 for a page with no free
    /// space.
    pub fn fragmentation(&self) -> f64 {
        let free = self.free_slots();
        let total: usize = free.iter().map(Slot::len).sum();
        if total == 0 {
            return 0.0;
        }
        let largest = free.iter().map(Slot::len).max().unwrap_or(0);
        1.0 - largest as f64 / total as f64
    }
}
