//! Tests for the free list
//!
//! These tests verify:
//! - Releasing ranges creates the `$trash` root entry lazily
//! - First-fit reuse: exact fits leave a spare, larger entries split
//! - Spare entries are refilled before new ones are appended
//! - Reused space is re-initialized to the record default
//! - The free list survives reopen
//! - `reuse_freed = false` and `allocate` bypass the list
//! - The `$trash` root entry is protected from caller operations on the root

use std::path::PathBuf;
use std::thread;

use bytes::{Buf, BufMut};
use celldb::store::{Allocation, Trash, TrashEntry};
use celldb::{
    Cell, CellDbError, CancellationToken, Config, FileStore, Offset, Record, String64, TreeNode,
    TRASH_KEY,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("trash.cell");
    (temp_dir, path)
}

fn trash_key() -> String64 {
    String64::new(TRASH_KEY)
}

fn is_rejected<T>(result: Result<T, CellDbError>) -> bool {
    matches!(result, Err(CellDbError::InvalidArgument(_)))
}

fn root_has_trash(store: &FileStore) -> bool {
    store
        .root()
        .unwrap()
        .children()
        .any(|node| node.unwrap().value().key == TRASH_KEY)
}

/// 20-byte record, small enough to be carved out of a reclaimed node
#[derive(Debug, Clone, PartialEq)]
struct Small {
    a: u64,
    b: u32,
    next: Offset,
}

impl Default for Small {
    fn default() -> Self {
        Self {
            a: 0,
            b: 0,
            next: Offset::NONE,
        }
    }
}

impl Record for Small {
    const SIZE: usize = 20;

    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u64_le(self.a);
        buf.put_u32_le(self.b);
        self.next.put(&mut buf);
    }

    fn decode(mut buf: &[u8]) -> Self {
        let a = buf.get_u64_le();
        let b = buf.get_u32_le();
        let next = Offset::take(&mut buf);
        Self { a, b, next }
    }
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn test_empty_store_has_no_free_list() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();

    assert!(store.free_ranges().unwrap().is_empty());
    assert!(store.root().unwrap().get(&String64::new(TRASH_KEY)).unwrap().is_none());
}

#[test]
fn test_release_creates_trash_entry() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let offset = store.allocate(80).unwrap();

    store.release(offset, 80).unwrap();

    let root = store.root().unwrap();
    let trash = root.get(&String64::new(TRASH_KEY)).unwrap().unwrap();
    assert_eq!(trash.value().key, TRASH_KEY);
    assert_eq!(store.free_ranges().unwrap(), vec![(offset, 80)]);

    let trash = trash.cast::<Trash>().unwrap();
    let entries: Vec<TrashEntry> = trash.children().map(|e| e.unwrap().value()).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].offset, Offset::new(offset));
    assert_eq!(entries[0].length, 80);
}

#[test]
fn test_release_invalid_length_rejected() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();

    assert!(matches!(store.release(80, 0), Err(CellDbError::InvalidArgument(_))));
    assert!(matches!(
        store.release(80, u32::MAX as usize + 1),
        Err(CellDbError::InvalidArgument(_))
    ));
    assert!(store.free_ranges().unwrap().is_empty());
}

#[test]
fn test_reclaim_pushes_range() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap();

    assert!(root.reclaim(a.offset()).unwrap());

    assert!(root.get(&String64::new("a")).unwrap().is_none());
    assert_eq!(store.free_ranges().unwrap(), vec![(a.offset(), TreeNode::SIZE as u32)]);

    // Only the free list remains under the root
    let keys: Vec<String> = root.children().map(|c| c.unwrap().value().key.into()).collect();
    assert_eq!(keys, vec![TRASH_KEY.to_string()]);
}

#[test]
fn test_reclaim_missing_offset() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();

    assert!(!root.reclaim(12345).unwrap());
    assert!(store.free_ranges().unwrap().is_empty());
}

// =============================================================================
// Reuse Tests
// =============================================================================

#[test]
fn test_exact_fit_reused() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();
    root.reclaim(a).unwrap();

    let b = root.get_or_add(&String64::new("b")).unwrap();

    assert_eq!(b.offset(), a);
    assert_eq!(b.value().key, "b");
    assert!(store.free_ranges().unwrap().is_empty());
}

#[test]
fn test_allocate_record_reports_reuse() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let offset = store.allocate(80).unwrap();
    store.release(offset, 80).unwrap();

    let reused = store.allocate_record(80).unwrap();
    let fresh = store.allocate_record(80).unwrap();

    assert_eq!(
        reused,
        Allocation {
            offset,
            reused: true
        }
    );
    assert!(!fresh.reused);
    assert_eq!(fresh.offset + 80, store.len());
}

#[test]
fn test_larger_entry_split() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let offset = store.allocate(80).unwrap();
    store.release(offset, 80).unwrap();

    let small = Cell::<Small>::create(&store).unwrap();

    assert_eq!(small.offset(), offset);
    assert_eq!(store.free_ranges().unwrap(), vec![(offset + 20, 60)]);

    let second = Cell::<Small>::create(&store).unwrap();
    assert_eq!(second.offset(), offset + 20);
    assert_eq!(store.free_ranges().unwrap(), vec![(offset + 40, 40)]);
}

#[test]
fn test_too_small_entries_skipped() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let small = store.allocate(20).unwrap();
    store.release(small, 20).unwrap();
    let cursor = store.len();

    let node = Cell::<TreeNode>::create(&store).unwrap();

    assert_eq!(node.offset(), cursor);
    assert_eq!(store.free_ranges().unwrap(), vec![(small, 20)]);
}

#[test]
fn test_first_fit_order() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let first = store.allocate(40).unwrap();
    let second = store.allocate(40).unwrap();
    store.release(first, 40).unwrap();
    store.release(second, 40).unwrap();

    // Newest entry sits at the head of the chain
    let taken = store.allocate_record(20).unwrap();

    assert_eq!(taken.offset, second);
    let mut ranges = store.free_ranges().unwrap();
    ranges.sort_unstable();
    assert_eq!(ranges, vec![(first, 40), (second + 20, 20)]);
}

#[test]
fn test_spare_entry_refilled() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();
    root.reclaim(a).unwrap();
    let b = root.get_or_add(&String64::new("b")).unwrap().offset();
    assert_eq!(b, a);

    let cursor = store.len();
    root.reclaim(b).unwrap();

    // The spare left by the exact fit took the range; nothing was appended
    assert_eq!(store.len(), cursor);
    assert_eq!(store.free_ranges().unwrap(), vec![(b, 80)]);

    let trash = root
        .get(&String64::new(TRASH_KEY))
        .unwrap()
        .unwrap()
        .cast::<Trash>()
        .unwrap();
    assert_eq!(trash.children().count(), 1);
}

#[test]
fn test_reused_space_reset_to_default() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap();
    a.get_or_add(&String64::new("inner")).unwrap();
    assert!(a.value().child.is_some());

    root.reclaim(a.offset()).unwrap();
    let reused = Cell::<TreeNode>::create(&store).unwrap();

    assert_eq!(reused.offset(), a.offset());
    assert!(reused.is_default());
}

#[test]
fn test_reuse_across_record_widths() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();
    store.flush().unwrap();

    root.reclaim(a).unwrap();
    let small = Cell::<Small>::create(&store).unwrap();
    small.update(|s| s.a = 7);

    assert_eq!(small.offset(), a);
    assert_eq!(small.value().next, Offset::NONE);
    store.flush().unwrap();
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_reuse_disabled() {
    let (_temp, path) = setup_temp_store();
    let config = Config::builder().path(&path).reuse_freed(false).build();
    let store = FileStore::open(config).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();
    root.reclaim(a).unwrap();

    let b = root.get_or_add(&String64::new("b")).unwrap().offset();

    assert_ne!(b, a);
    assert_eq!(store.free_ranges().unwrap(), vec![(a, 80)]);
}

#[test]
fn test_allocate_ignores_free_list() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let offset = store.allocate(80).unwrap();
    store.release(offset, 80).unwrap();
    let cursor = store.len();

    assert_eq!(store.allocate(80).unwrap(), cursor);
    assert_eq!(store.free_ranges().unwrap(), vec![(offset, 80)]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_free_list_survives_reopen() {
    let (_temp, path) = setup_temp_store();
    let a = {
        let store = FileStore::open_path(&path).unwrap();
        let root = store.root().unwrap();
        let a = root.get_or_add(&String64::new("a")).unwrap().offset();
        root.get_or_add(&String64::new("keep")).unwrap();
        root.reclaim(a).unwrap();
        store.flush().unwrap();
        a
    };

    let store = FileStore::open_path(&path).unwrap();
    assert_eq!(store.free_ranges().unwrap(), vec![(a, 80)]);

    let root = store.root().unwrap();
    let b = root.get_or_add(&String64::new("b")).unwrap();
    assert_eq!(b.offset(), a);
    assert!(root.get(&String64::new("keep")).unwrap().is_some());
}

// =============================================================================
// Reserved Entry Tests
// =============================================================================

#[test]
fn test_trash_key_rejected_at_root() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let cursor = store.len();

    assert!(is_rejected(root.get_or_add(&trash_key())));
    assert!(is_rejected(
        root.get_or_add_path(&[trash_key(), String64::new("zzzz")])
    ));
    // Rejected before anything was allocated
    assert_eq!(store.len(), cursor);

    let node = Cell::<TreeNode>::create_with(&store, |n| n.key = trash_key()).unwrap();
    assert!(is_rejected(root.add(&node)));
    assert_eq!(root.children().count(), 0);
}

#[test]
fn test_user_trash_key_cannot_corrupt_allocator() {
    let (_temp, path) = setup_temp_store();
    {
        let store = FileStore::open_path(&path).unwrap();
        let root = store.root().unwrap();
        assert!(root
            .get_or_add_path(&[trash_key(), String64::new("zzzz")])
            .is_err());
        root.get_or_add(&String64::new("victim")).unwrap();
        store.flush().unwrap();
    }

    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let victim = root.get(&String64::new("victim")).unwrap().unwrap().offset();
    root.reclaim(victim).unwrap();

    assert_eq!(store.free_ranges().unwrap(), vec![(victim, 80)]);
    assert_eq!(
        store.allocate_record(80).unwrap(),
        Allocation {
            offset: victim,
            reused: true
        }
    );
}

#[test]
fn test_trash_key_allowed_below_root() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();

    let nested = root
        .get_or_add_path(&[String64::new("a"), trash_key(), String64::new("b")])
        .unwrap();

    assert_eq!(nested.value().key, "b");
    assert!(store.free_ranges().unwrap().is_empty());
}

#[test]
fn test_free_list_entry_cannot_be_unlinked() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();
    root.reclaim(a).unwrap();
    let head = root.get(&trash_key()).unwrap().unwrap().offset();

    assert!(is_rejected(root.remove_key(&trash_key())));
    assert!(is_rejected(root.remove(head)));
    assert!(is_rejected(root.reclaim(head)));

    assert!(root_has_trash(&store));
    assert_eq!(store.free_ranges().unwrap(), vec![(a, 80)]);
}

#[test]
fn test_nothing_hangs_under_free_list() {
    let (_temp, path) = setup_temp_store();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let node = Cell::<TreeNode>::create(&store).unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();
    root.reclaim(a).unwrap();

    let head = root.get(&trash_key()).unwrap().unwrap();

    assert!(is_rejected(head.get_or_add(&String64::new("x"))));
    assert!(is_rejected(head.add(&node)));
    assert_eq!(store.free_ranges().unwrap(), vec![(a, 80)]);
}

#[test]
fn test_cleared_root_relinks_free_list() {
    let (_temp, path) = setup_temp_store();
    let c = {
        let store = FileStore::open_path(&path).unwrap();
        let root = store.root().unwrap();
        let a = root.get_or_add(&String64::new("a")).unwrap().offset();
        root.reclaim(a).unwrap();

        root.clear();
        let b = root.get_or_add(&String64::new("b")).unwrap().offset();
        let c = root.get_or_add(&String64::new("c")).unwrap().offset();
        root.reclaim(c).unwrap();

        // "b" took the range freed by "a"; the free list is back under the root
        assert_eq!(b, a);
        assert!(root_has_trash(&store));
        assert_eq!(store.free_ranges().unwrap(), vec![(c, 80)]);

        store.flush().unwrap();
        c
    };

    let store = FileStore::open_path(&path).unwrap();
    assert_eq!(store.free_ranges().unwrap(), vec![(c, 80)]);
}

#[test]
fn test_flush_relinks_cleared_free_list() {
    let (_temp, path) = setup_temp_store();
    let a = {
        let store = FileStore::open_path(&path).unwrap();
        let root = store.root().unwrap();
        let a = root.get_or_add(&String64::new("a")).unwrap().offset();
        root.reclaim(a).unwrap();
        root.clear();
        store.flush().unwrap();
        a
    };

    let store = FileStore::open_path(&path).unwrap();
    assert!(root_has_trash(&store));
    assert_eq!(store.free_ranges().unwrap(), vec![(a, 80)]);
}

#[test]
fn test_first_release_races_root_adds() {
    const KEYS: usize = 20;

    for _ in 0..50 {
        let (_temp, path) = setup_temp_store();
        let store = FileStore::open_path(&path).unwrap();
        let root = store.root().unwrap();
        let sub = root.get_or_add(&String64::new("sub")).unwrap();
        let x = sub.get_or_add(&String64::new("x")).unwrap().offset();

        thread::scope(|scope| {
            scope.spawn(|| {
                let root = store.root().unwrap();
                for i in 0..KEYS {
                    root.get_or_add(&String64::new(&format!("k{}", i))).unwrap();
                }
            });
            scope.spawn(|| {
                assert!(sub.reclaim(x).unwrap());
            });
        });

        // "sub", every "k", and the free list
        assert_eq!(root.children().count(), KEYS + 2);
        assert!(root_has_trash(&store));
    }
}

// =============================================================================
// Async Tests
// =============================================================================

#[tokio::test]
async fn test_async_release_and_reuse() {
    let (_temp, path) = setup_temp_store();
    let token = CancellationToken::new();
    let store = FileStore::open_path(&path).unwrap();
    let offset = store.allocate(80).unwrap();

    store.release_async(offset, 80, &token).await.unwrap();
    let allocation = store.allocate_record_async(80, &token).await.unwrap();

    assert_eq!(allocation.offset, offset);
    assert!(allocation.reused);
}

#[tokio::test]
async fn test_async_reuse_after_reopen() {
    let (_temp, path) = setup_temp_store();
    let a = {
        let store = FileStore::open_path(&path).unwrap();
        let root = store.root().unwrap();
        let a = root.get_or_add(&String64::new("a")).unwrap().offset();
        root.reclaim(a).unwrap();
        store.flush().unwrap();
        a
    };

    let token = CancellationToken::new();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root_async(&token).await.unwrap();
    let b = root.get_or_add_async(&String64::new("b"), &token).await.unwrap();

    assert_eq!(b.offset(), a);
    assert!(store.free_ranges().unwrap().is_empty());
}

#[tokio::test]
async fn test_async_reclaim() {
    let (_temp, path) = setup_temp_store();
    let token = CancellationToken::new();
    let store = FileStore::open_path(&path).unwrap();
    let root = store.root().unwrap();
    let a = root.get_or_add(&String64::new("a")).unwrap().offset();

    assert!(root.reclaim_async(a, &token).await.unwrap());
    assert!(!root.reclaim_async(a, &token).await.unwrap());
    assert_eq!(store.free_ranges().unwrap(), vec![(a, 80)]);
}
