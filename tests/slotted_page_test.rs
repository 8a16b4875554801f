//! Integration tests for slotted page storage

use std::collections::BTreeMap;

use celldb::common::{PageId, StorageError};
use celldb::storage::page::{Cell, Page, HEADER_SIZE, SLOT_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PAGE_SIZE: usize = 1024;

fn assert_accounting(page: &Page) {
    let cells: usize = page.slots().iter().map(|slot| slot.len()).sum();
    let directory = (page.cell_count() as usize + 1) * SLOT_SIZE;
    assert_eq!(
        HEADER_SIZE + directory + cells + page.free_space(),
        page.page_size()
    );
}

#[test]
fn test_round_trip_mixed_cells() {
    let mut page = Page::new(PageId::new(9), PAGE_SIZE);
    page.store_record_cell(b"apple", b"red").unwrap();
    page.store_pointer_cell(b"banana", PageId::new(12)).unwrap();
    page.store_record_cell(b"cherry", b"").unwrap();

    assert_eq!(
        page.cell(b"apple").unwrap(),
        Some(Cell::record(b"apple".to_vec(), b"red".to_vec()))
    );
    assert_eq!(
        page.cell(b"banana").unwrap(),
        Some(Cell::pointer(b"banana".to_vec(), PageId::new(12)))
    );
    assert_eq!(
        page.cell(b"cherry").unwrap(),
        Some(Cell::record(b"cherry".to_vec(), Vec::new()))
    );
    assert_eq!(page.cell(b"durian").unwrap(), None);

    // The raw bytes reload into an identical page.
    let reloaded = Page::from_bytes(page.as_bytes().to_vec(), PAGE_SIZE).unwrap();
    assert_eq!(reloaded.id(), PageId::new(9));
    assert_eq!(reloaded.cells().unwrap(), page.cells().unwrap());
}

#[test]
fn test_cells_come_back_in_key_order() {
    let mut page = Page::new(PageId::new(0), PAGE_SIZE);
    for key in ["m", "c", "x", "a", "q"] {
        page.store_record_cell(key.as_bytes(), b"v").unwrap();
    }

    let keys: Vec<Vec<u8>> = page
        .cells()
        .unwrap()
        .iter()
        .map(|cell| cell.key().to_vec())
        .collect();
    assert_eq!(
        keys,
        vec![b"a".to_vec(), b"c".to_vec(), b"m".to_vec(), b"q".to_vec(), b"x".to_vec()]
    );
}

#[test]
fn test_delete_keeps_page_consistent() {
    let mut page = Page::new(PageId::new(0), PAGE_SIZE);
    for i in 0..10u8 {
        page.store_record_cell(&[b'k', i], &[i; 8]).unwrap();
    }

    assert!(page.delete_cell(&[b'k', 4]).unwrap());
    assert!(!page.delete_cell(&[b'k', 4]).unwrap());
    assert_eq!(page.cell_count(), 9);
    assert_eq!(page.cell(&[b'k', 4]).unwrap(), None);
    assert_eq!(
        page.cell(&[b'k', 5]).unwrap(),
        Some(Cell::record(vec![b'k', 5], vec![5; 8]))
    );
    assert_accounting(&page);
}

#[test]
fn test_duplicate_key_rejected() {
    let mut page = Page::new(PageId::new(0), PAGE_SIZE);
    page.store_record_cell(b"k", b"one").unwrap();
    assert!(matches!(
        page.store_pointer_cell(b"k", PageId::new(1)),
        Err(StorageError::DuplicateKey)
    ));
    assert_eq!(page.cell_count(), 1);
}

#[test]
fn test_full_page_accepts_cell_after_delete() {
    let mut page = Page::new(PageId::new(0), 256);
    let mut stored = 0u16;
    loop {
        match page.store_record_cell(&stored.to_be_bytes(), &[0xAA; 10]) {
            Ok(()) => stored += 1,
            Err(StorageError::PageFull { .. }) => break,
            Err(err) => panic!("unexpected error: {}", err),
        }
    }
    assert!(stored > 0);
    assert_accounting(&page);

    // Still full: nothing changed since the first refusal.
    assert!(matches!(
        page.store_record_cell(&stored.to_be_bytes(), &[0xAA; 10]),
        Err(StorageError::PageFull { .. })
    ));
    assert_eq!(page.cell_count(), stored);

    assert!(page.delete_cell(&0u16.to_be_bytes()).unwrap());
    page.store_record_cell(&stored.to_be_bytes(), &[0xBB; 10])
        .unwrap();
    assert_eq!(page.cell_count(), stored);
    assert_accounting(&page);
}

#[test]
fn test_defragment_is_idempotent() {
    let mut page = Page::new(PageId::new(0), PAGE_SIZE);
    for i in 0..12u8 {
        page.store_record_cell(&[i], &vec![i; i as usize * 3]).unwrap();
    }
    for i in (0..12u8).step_by(3) {
        page.delete_cell(&[i]).unwrap();
    }
    let before = page.cells().unwrap();
    let free = page.free_space();

    page.defragment();
    assert_eq!(page.free_slots().len(), 1);
    assert_eq!(page.free_space(), free);
    assert_eq!(page.fragmentation(), 0.0);
    assert_eq!(page.cells().unwrap(), before);

    let once = page.as_bytes().to_vec();
    page.defragment();
    assert_eq!(page.as_bytes(), once.as_slice());
}

#[test]
fn test_random_inserts_and_deletes_match_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut page = Page::new(PageId::new(3), PAGE_SIZE);
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for _ in 0..2000 {
        let key = format!("key{:03}", rng.gen_range(0..64)).into_bytes();
        if rng.gen_bool(0.6) {
            let value: Vec<u8> = (0..rng.gen_range(0..40)).map(|_| rng.gen()).collect();
            match page.store_record_cell(&key, &value) {
                Ok(()) => {
                    assert!(model.insert(key, value).is_none());
                }
                Err(StorageError::DuplicateKey) => assert!(model.contains_key(&key)),
                Err(StorageError::PageFull { .. }) => {
                    assert!(!model.contains_key(&key));
                    page.defragment();
                }
                Err(err) => panic!("unexpected error: {}", err),
            }
        } else {
            assert_eq!(page.delete_cell(&key).unwrap(), model.remove(&key).is_some());
        }

        assert_accounting(&page);
        assert_eq!(page.cell_count() as usize, model.len());
    }

    let expected: Vec<Cell> = model
        .into_iter()
        .map(|(key, value)| Cell::record(key, value))
        .collect();
    assert_eq!(page.cells().unwrap(), expected);
}
