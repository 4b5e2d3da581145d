//! Linked-list operations for any `Collection` head

use tokio_util::sync::CancellationToken;

use crate::cell::Cell;
use crate::error::{CellDbError, Result};
use crate::record::{Collection, CollectionItem, Offset, Record};
use crate::store::{is_trash_bytes, is_trash_record, TRASH_KEY};

use super::{Children, ChildrenAsync};

impl<'s, T: Collection> Cell<'s, T> {
    // =========================================================================
    // Traversal
    // =========================================================================

    /// Elements of this node's chain, newest first
    pub fn children(&self) -> Children<'s, T::Item> {
        Children::new(self.store(), self.value().child())
    }

    pub fn children_async(&self, token: &CancellationToken) -> ChildrenAsync<'s, T::Item> {
        ChildrenAsync::new(self.store(), self.value().child(), token)
    }

    /// First element matching `predicate`
    pub fn find(
        &self,
        mut predicate: impl FnMut(&T::Item) -> bool,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        for child in self.children() {
            let child = child?;
            if predicate(&child.value()) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    pub async fn find_async(
        &self,
        mut predicate: impl FnMut(&T::Item) -> bool,
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        let mut children = self.children_async(token);
        while let Some(child) = children.try_next().await? {
            if predicate(&child.value()) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Link `item` at the head of the chain
    ///
    /// `item.Next` takes the old `Child`, then `Child` points at `item`.
    /// A `$trash` entry cannot be added to the root.
    pub fn add(&self, item: &Cell<'_, T::Item>) -> Result<()> {
        if item.offset() == self.offset() {
            return Err(CellDbError::InvalidArgument(format!(
                "cannot link record @{} under itself",
                item.offset()
            )));
        }
        self.guard_reserved(&item.value())?;
        self.link_unchecked(item);
        Ok(())
    }

    /// Allocate a default element and link it at the head
    pub fn add_new(&self) -> Result<Cell<'s, T::Item>> {
        let item = Cell::<T::Item>::create(self.store())?;
        self.add(&item)?;
        Ok(item)
    }

    pub async fn add_new_async(&self, token: &CancellationToken) -> Result<Cell<'s, T::Item>> {
        let item = Cell::<T::Item>::create_async(self.store(), token).await?;
        self.add(&item)?;
        Ok(item)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Unlink the element at `offset`
    ///
    /// Only the chain changes; the element's bytes and its own links are
    /// left as they were. See `reclaim` to also free the space.
    pub fn remove(&self, offset: u64) -> Result<Option<Cell<'s, T::Item>>> {
        self.remove_first(|child| child.offset() == offset)
    }

    pub async fn remove_async(
        &self,
        offset: u64,
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        self.remove_first_async(|child| child.offset() == offset, token)
            .await
    }

    /// Unlink the element at `offset` and return its range to the free list
    ///
    /// The element's own sub-chain is not reclaimed. Returns false if no
    /// element of this chain lives at `offset`.
    pub fn reclaim(&self, offset: u64) -> Result<bool> {
        match self.remove(offset)? {
            Some(_) => {
                self.store().release(offset, <T::Item as Record>::SIZE)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn reclaim_async(&self, offset: u64, token: &CancellationToken) -> Result<bool> {
        match self.remove_async(offset, token).await? {
            Some(_) => {
                self.store()
                    .release_async(offset, <T::Item as Record>::SIZE, token)
                    .await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detach the whole chain; detached elements are not reclaimed
    pub fn clear(&self) {
        self.update(|node| node.set_child(Offset::NONE));
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    pub(crate) fn remove_first(
        &self,
        mut matches: impl FnMut(&Cell<'s, T::Item>) -> bool,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        let mut previous = None;
        for child in self.children() {
            let child = child?;
            if matches(&child) {
                self.guard_reserved(&child.value())?;
                self.unlink(previous.as_ref(), &child);
                return Ok(Some(child));
            }
            previous = Some(child);
        }
        Ok(None)
    }

    pub(crate) async fn remove_first_async(
        &self,
        mut matches: impl FnMut(&Cell<'s, T::Item>) -> bool,
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        let mut previous = None;
        let mut children = self.children_async(token);
        while let Some(child) = children.try_next().await? {
            if matches(&child) {
                self.guard_reserved(&child.value())?;
                self.unlink(previous.as_ref(), &child);
                return Ok(Some(child));
            }
            previous = Some(child);
        }
        Ok(None)
    }

    /// Link without checks; the free list uses this for its own records
    pub(crate) fn link_unchecked(&self, item: &Cell<'_, T::Item>) {
        self.update(|node| {
            item.update(|entry| entry.set_next(node.child()));
            node.set_child(item.link());
        });
    }

    /// Reject structural changes that would touch the free list: a `$trash`
    /// entry directly under the root, or anything under the live free-list
    /// head
    pub(crate) fn guard_reserved(&self, item: &T::Item) -> Result<()> {
        let at_root = self.offset() == 0 && is_trash_record(item);
        let under_trash = !at_root
            && self.raw().with_bytes(is_trash_bytes)
            && self.store().is_trash_head(self.offset())?;
        if at_root || under_trash {
            return Err(CellDbError::InvalidArgument(format!(
                "`{}` is reserved for the free list",
                TRASH_KEY
            )));
        }
        Ok(())
    }

    /// Point the predecessor (or this head) past `child`
    fn unlink(&self, previous: Option<&Cell<'s, T::Item>>, child: &Cell<'s, T::Item>) {
        let next = child.value().next();
        match previous {
            Some(previous) => {
                previous.update(|entry| entry.set_next(next));
            }
            None => {
                self.update(|node| node.set_child(next));
            }
        }
    }
}
