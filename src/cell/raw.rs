//! Untyped cell: a cached byte window bound to a store offset.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::store::{Allocation, FileStore, Page};

/// A resident byte range of the store file
///
/// Borrows the store; never owns file resources.
#[derive(Clone)]
pub struct RawCell<'s> {
    store: &'s FileStore,
    offset: u64,
    page: Arc<Page>,
}

impl<'s> RawCell<'s> {
    /// Bind to `length` bytes at `offset` (through the page cache)
    pub fn read(store: &'s FileStore, offset: u64, length: usize) -> Result<Self> {
        let page = store.read(offset, length)?;
        Ok(Self {
            store,
            offset,
            page,
        })
    }

    pub async fn read_async(
        store: &'s FileStore,
        offset: u64,
        length: usize,
        token: &CancellationToken,
    ) -> Result<Self> {
        let page = store.read_async(offset, length, token).await?;
        Ok(Self {
            store,
            offset,
            page,
        })
    }

    /// Allocate `length` bytes and bind to them, zeroed
    ///
    /// The new window is always written by the next flush.
    pub fn create(store: &'s FileStore, length: usize) -> Result<Self> {
        let allocation = store.allocate_record(length)?;
        Self::bind_allocation(store, allocation, length)
    }

    pub async fn create_async(
        store: &'s FileStore,
        length: usize,
        token: &CancellationToken,
    ) -> Result<Self> {
        let allocation = store.allocate_record_async(length, token).await?;
        store
            .grow_for_async(allocation.offset + length as u64, token)
            .await?;
        let cell = Self::read_async(store, allocation.offset, length, token).await?;
        cell.reset(allocation.reused);
        Ok(cell)
    }

    /// Cursor-only allocation, bypassing the free list
    pub(crate) fn create_appended(store: &'s FileStore, length: usize) -> Result<Self> {
        let offset = store.allocate(length)?;
        Self::bind_allocation(
            store,
            Allocation {
                offset,
                reused: false,
            },
            length,
        )
    }

    fn bind_allocation(store: &'s FileStore, allocation: Allocation, length: usize) -> Result<Self> {
        store.grow_for(allocation.offset + length as u64)?;
        let cell = Self::read(store, allocation.offset, length)?;
        cell.reset(allocation.reused);
        Ok(cell)
    }

    /// Zero reused bytes and make sure the window reaches the file on flush
    fn reset(&self, reused: bool) {
        if reused {
            self.with_bytes_mut(|bytes| bytes.fill(0));
        }
        self.page.invalidate();
    }

    pub fn store(&self) -> &'s FileStore {
        self.store
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.page.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_empty()
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Copy of the current bytes
    pub fn bytes(&self) -> Vec<u8> {
        self.page.snapshot()
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.page.with_bytes(f)
    }

    /// Mutate in memory; persisted by `save` or the store's `flush`
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.page.with_bytes_mut(f)
    }

    /// Write this window to the file now
    pub fn save(&self) -> Result<()> {
        self.store.save_page(self.offset, &self.page)
    }

    pub async fn save_async(&self, token: &CancellationToken) -> Result<()> {
        self.store.save_page_async(self.offset, &self.page, token).await
    }
}

impl std::fmt::Debug for RawCell<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCell")
            .field("offset", &self.offset)
            .field("len", &self.len())
            .finish()
    }
}
