//! Free List (Trash)
//!
//! Reclaimed byte ranges, kept in the file under the reserved root key
//! `$trash`. The root entry is an ordinary `TreeNode`; its child chain is
//! read through the `Trash` view as a list of `TrashEntry` records.
//!
//! ## Entry Layout (20 bytes)
//! ```text
//! ┌────────────┬────────────┬───────────┐
//! │ Offset (8) │ Length (4) │ Next (8)  │
//! └────────────┴────────────┴───────────┘
//! ```
//!
//! ## Allocation Strategy
//! - First fit over the chain
//! - Exact fit: the entry becomes a spare (length 0) and stays linked
//! - Larger entry: split, handing out the front of the range
//! - Releasing a range fills a spare if one exists, otherwise appends a new
//!   entry at the cursor
//!
//! Bookkeeping records are always cursor-allocated so the free list never
//! allocates from itself.
//!
//! ## Reserved Entry
//! The structural operations refuse to add, look up for insertion, or unlink
//! a `$trash` entry at the root, and refuse to hang records under the live
//! free-list head. A `clear` of the root can still detach it; the next
//! free-list operation or flush links it back.

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cell::Cell;
use crate::error::{CellDbError, Result};
use crate::record::{Collection, CollectionItem, Offset, Record, String64, TreeNode};

use super::FileStore;

/// Reserved root key of the free list
pub const TRASH_KEY: &str = "$trash";

/// Where the free-list head lives, as far as this store knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrashHead {
    /// Root not searched yet
    Unresolved,
    /// Root has no `$trash` entry
    Absent,
    /// Offset of the `$trash` entry
    At(u64),
}

/// True if `bytes` hold a `TreeNode`-shaped record keyed `$trash`
pub(crate) fn is_trash_bytes(bytes: &[u8]) -> bool {
    bytes.len() == TreeNode::SIZE && TreeNode::decode(bytes).key == TRASH_KEY
}

/// True if `record` encodes to a `$trash`-keyed `TreeNode`
pub(crate) fn is_trash_record<R: Record>(record: &R) -> bool {
    if R::SIZE != TreeNode::SIZE {
        return false;
    }
    let mut bytes = vec![0u8; R::SIZE];
    record.encode(&mut bytes);
    is_trash_bytes(&bytes)
}

/// Result of `allocate_record`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub offset: u64,
    /// True if the range came from the free list (old bytes must not be trusted)
    pub reused: bool,
}

// =============================================================================
// Records
// =============================================================================

/// The `$trash` root entry viewed as the head of a free-range chain
///
/// Same layout as `TreeNode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trash {
    pub key: String64,
    pub next: Offset,
    pub child: Offset,
}

impl Default for Trash {
    fn default() -> Self {
        Self {
            key: String64::new(TRASH_KEY),
            next: Offset::NONE,
            child: Offset::NONE,
        }
    }
}

impl Record for Trash {
    const SIZE: usize = TreeNode::SIZE;

    fn encode(&self, mut buf: &mut [u8]) {
        self.key.put(&mut buf);
        self.next.put(&mut buf);
        self.child.put(&mut buf);
    }

    fn decode(mut buf: &[u8]) -> Self {
        let key = String64::take(&mut buf);
        let next = Offset::take(&mut buf);
        let child = Offset::take(&mut buf);
        Self { key, next, child }
    }
}

impl Collection for Trash {
    type Item = TrashEntry;

    fn child(&self) -> Offset {
        self.child
    }

    fn set_child(&mut self, child: Offset) {
        self.child = child;
    }
}

/// One reclaimed range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashEntry {
    pub offset: Offset,
    pub length: u32,
    pub next: Offset,
}

impl TrashEntry {
    /// A spare entry describes no range and can be refilled
    pub fn is_spare(&self) -> bool {
        self.length == 0 || self.offset.is_none()
    }
}

impl Default for TrashEntry {
    fn default() -> Self {
        Self {
            offset: Offset::NONE,
            length: 0,
            next: Offset::NONE,
        }
    }
}

impl Record for TrashEntry {
    const SIZE: usize = Offset::SIZE + 4 + Offset::SIZE;

    fn encode(&self, mut buf: &mut [u8]) {
        use bytes::BufMut;
        self.offset.put(&mut buf);
        buf.put_u32_le(self.length);
        self.next.put(&mut buf);
    }

    fn decode(mut buf: &[u8]) -> Self {
        use bytes::Buf;
        let offset = Offset::take(&mut buf);
        let length = buf.get_u32_le();
        let next = Offset::take(&mut buf);
        Self {
            offset,
            length,
            next,
        }
    }
}

impl CollectionItem for TrashEntry {
    fn next(&self) -> Offset {
        self.next
    }

    fn set_next(&mut self, next: Offset) {
        self.next = next;
    }
}

// =============================================================================
// Store Operations
// =============================================================================

impl FileStore {
    /// Allocate space for a record, reusing a freed range when allowed
    pub fn allocate_record(&self, length: usize) -> Result<Allocation> {
        if self.config().reuse_freed {
            if let Some(offset) = self.take_free(length)? {
                return Ok(Allocation {
                    offset,
                    reused: true,
                });
            }
        }
        Ok(Allocation {
            offset: self.allocate(length)?,
            reused: false,
        })
    }

    pub async fn allocate_record_async(
        &self,
        length: usize,
        token: &CancellationToken,
    ) -> Result<Allocation> {
        if self.config().reuse_freed {
            self.warm_trash_async(token).await?;
            if let Some(offset) = self.take_free(length)? {
                return Ok(Allocation {
                    offset,
                    reused: true,
                });
            }
        }
        Ok(Allocation {
            offset: self.allocate(length)?,
            reused: false,
        })
    }

    /// Return a range to the free list
    ///
    /// Creates the `$trash` root entry on first use. The caller must make sure
    /// nothing reachable still points into the range.
    pub fn release(&self, offset: u64, length: usize) -> Result<()> {
        let length = u32::try_from(length)
            .ok()
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                CellDbError::InvalidArgument(format!("cannot release {} bytes", length))
            })?;

        let mut head = self.trash.lock();
        let trash = self.trash_or_create(&mut head)?;
        self.evict(offset);

        let fill = |entry: &mut TrashEntry| {
            entry.offset = Offset::new(offset);
            entry.length = length;
        };
        match trash.find(TrashEntry::is_spare)? {
            Some(spare) => {
                spare.update(fill);
            }
            None => {
                let entry = Cell::<TrashEntry>::create_appended(self)?;
                entry.update(fill);
                trash.link_unchecked(&entry);
            }
        }

        trace!(offset, length, "Released range to free list");
        Ok(())
    }

    pub async fn release_async(
        &self,
        offset: u64,
        length: usize,
        token: &CancellationToken,
    ) -> Result<()> {
        self.warm_trash_async(token).await?;
        self.release(offset, length)
    }

    /// Non-spare `(offset, length)` ranges currently on the free list
    pub fn free_ranges(&self) -> Result<Vec<(u64, u32)>> {
        let mut head = self.trash.lock();
        let trash = match self.trash_cell(&mut head)? {
            Some(trash) => trash,
            None => return Ok(Vec::new()),
        };

        let mut ranges = Vec::new();
        for entry in trash.children() {
            let entry = entry?.value();
            if let (false, Some(offset)) = (entry.is_spare(), entry.offset.get()) {
                ranges.push((offset, entry.length));
            }
        }
        Ok(ranges)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// First fit; `None` if nothing on the list is large enough
    fn take_free(&self, length: usize) -> Result<Option<u64>> {
        let wanted = match u32::try_from(length) {
            Ok(wanted) if wanted > 0 => wanted,
            _ => return Ok(None),
        };

        let mut head = self.trash.lock();
        let trash = match self.trash_cell(&mut head)? {
            Some(trash) => trash,
            None => return Ok(None),
        };
        let entry = match trash.find(|e| !e.is_spare() && e.length >= wanted)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let before = entry.value();
        let Some(offset) = before.offset.get() else {
            return Ok(None);
        };
        entry.update(|e| {
            if e.length == wanted {
                e.offset = Offset::NONE;
                e.length = 0;
            } else {
                e.offset = Offset::new(offset + wanted as u64);
                e.length -= wanted;
            }
        });

        trace!(offset, length, remaining = before.length - wanted, "Reused freed range");
        Ok(Some(offset))
    }

    /// True if `offset` is the free-list head of this store
    pub(crate) fn is_trash_head(&self, offset: u64) -> Result<bool> {
        let mut head = self.trash.lock();
        if *head == TrashHead::Unresolved {
            *head = self.find_trash_head()?;
        }
        Ok(*head == TrashHead::At(offset))
    }

    /// Link a detached free list back under the root
    pub(crate) fn attach_trash(&self) -> Result<()> {
        let mut head = self.trash.lock();
        if let TrashHead::At(_) = *head {
            self.trash_cell(&mut head)?;
        }
        Ok(())
    }

    pub(crate) async fn attach_trash_async(&self, token: &CancellationToken) -> Result<()> {
        let known = *self.trash.lock();
        if let TrashHead::At(_) = known {
            self.warm_trash_async(token).await?;
            self.attach_trash()?;
        }
        Ok(())
    }

    fn find_trash_head(&self) -> Result<TrashHead> {
        let found = self.root()?.find(|node| node.key == TRASH_KEY)?;
        Ok(found.map_or(TrashHead::Absent, |node| TrashHead::At(node.offset())))
    }

    /// The free-list head, relinked under the root if a `clear` detached it
    fn trash_cell(&self, head: &mut TrashHead) -> Result<Option<Cell<'_, Trash>>> {
        if *head == TrashHead::Unresolved {
            *head = self.find_trash_head()?;
        }
        let TrashHead::At(offset) = *head else {
            return Ok(None);
        };

        let root = self.root()?;
        let trash = Cell::<Trash>::read(self, offset)?;
        let mut linked = false;
        for node in root.children() {
            if node?.offset() == offset {
                linked = true;
                break;
            }
        }
        if !linked {
            root.link_unchecked(&trash.clone().cast::<TreeNode>()?);
            debug!(offset, "Relinked detached free list under the root");
        }
        Ok(Some(trash))
    }

    fn trash_or_create(&self, head: &mut TrashHead) -> Result<Cell<'_, Trash>> {
        if let Some(trash) = self.trash_cell(head)? {
            return Ok(trash);
        }
        let trash = Cell::<Trash>::create_appended(self)?;
        self.root()?.link_unchecked(&trash.clone().cast::<TreeNode>()?);
        *head = TrashHead::At(trash.offset());
        Ok(trash)
    }

    /// Pull the root chain and the free-list chain into the cache so the
    /// synchronous bookkeeping that follows performs no I/O
    async fn warm_trash_async(&self, token: &CancellationToken) -> Result<()> {
        let known = *self.trash.lock();
        if known == TrashHead::Absent {
            return Ok(());
        }

        // The whole root chain: relinking checks every entry
        let root = self.root_async(token).await?;
        let mut head = match known {
            TrashHead::At(offset) => Some(offset),
            _ => None,
        };
        let mut nodes = root.children_async(token);
        while let Some(node) = nodes.try_next().await? {
            if head.is_none() && node.value().key == TRASH_KEY {
                head = Some(node.offset());
            }
        }

        if let Some(offset) = head {
            let trash = Cell::<Trash>::read_async(self, offset, token).await?;
            let mut entries = trash.children_async(token);
            while entries.try_next().await?.is_some() {}
        }
        Ok(())
    }
}
