//! Typed cell: a record overlaid on a cached byte window.

use std::marker::PhantomData;

use tokio_util::sync::CancellationToken;

use crate::error::{CellDbError, Result};
use crate::record::{is_zeroed, Offset, Record};
use crate::store::FileStore;

use super::RawCell;

/// A record of type `T` at a fixed offset
///
/// Field access goes through an explicit codec: `value` decodes a copy,
/// `set_value` encodes it back into the window. Neither touches the file;
/// persist with `save` or `FileStore::flush`.
///
/// ## Concurrency
/// `update` locks the shared page, so it is atomic with respect to every
/// other `update` on the same offset, through any handle. `set_value` takes
/// no such lock. Nested updates (as in `add`) lock the head before the item;
/// two threads linking a pair of records under each other can deadlock.
pub struct Cell<'s, T: Record> {
    raw: RawCell<'s>,
    _record: PhantomData<fn() -> T>,
}

impl<'s, T: Record> Cell<'s, T> {
    // =========================================================================
    // Binding
    // =========================================================================

    /// Bind to an existing record without allocating
    pub fn read(store: &'s FileStore, offset: u64) -> Result<Self> {
        Self::bind(RawCell::read(store, offset, T::SIZE)?)
    }

    pub async fn read_async(
        store: &'s FileStore,
        offset: u64,
        token: &CancellationToken,
    ) -> Result<Self> {
        Self::bind(RawCell::read_async(store, offset, T::SIZE, token).await?)
    }

    /// Bind through a link field; `NONE` is rejected
    pub fn follow(store: &'s FileStore, link: Offset) -> Result<Self> {
        Self::read(store, Self::target(link)?)
    }

    pub async fn follow_async(
        store: &'s FileStore,
        link: Offset,
        token: &CancellationToken,
    ) -> Result<Self> {
        Self::read_async(store, Self::target(link)?, token).await
    }

    /// Allocate a new record initialized to `T::default()`
    pub fn create(store: &'s FileStore) -> Result<Self> {
        let cell = Self::bind(RawCell::create(store, T::SIZE)?)?;
        cell.normalize();
        Ok(cell)
    }

    /// Allocate, then apply `init` before anyone else can see the record
    pub fn create_with(store: &'s FileStore, init: impl FnOnce(&mut T)) -> Result<Self> {
        let cell = Self::create(store)?;
        cell.update(init);
        Ok(cell)
    }

    pub async fn create_async(store: &'s FileStore, token: &CancellationToken) -> Result<Self> {
        let cell = Self::bind(RawCell::create_async(store, T::SIZE, token).await?)?;
        cell.normalize();
        Ok(cell)
    }

    pub async fn create_with_async(
        store: &'s FileStore,
        init: impl FnOnce(&mut T),
        token: &CancellationToken,
    ) -> Result<Self> {
        let cell = Self::create_async(store, token).await?;
        cell.update(init);
        Ok(cell)
    }

    /// Cursor-only creation, bypassing the free list
    pub(crate) fn create_appended(store: &'s FileStore) -> Result<Self> {
        let cell = Self::bind(RawCell::create_appended(store, T::SIZE)?)?;
        cell.normalize();
        Ok(cell)
    }

    fn bind(raw: RawCell<'s>) -> Result<Self> {
        if raw.len() != T::SIZE {
            return Err(CellDbError::RecordSize {
                expected: T::SIZE,
                actual: raw.len(),
            });
        }
        Ok(Self {
            raw,
            _record: PhantomData,
        })
    }

    fn target(link: Offset) -> Result<u64> {
        link.get().ok_or_else(|| {
            CellDbError::InvalidArgument("cannot follow a NONE link".to_string())
        })
    }

    /// Zero bytes are not a valid record; replace them with the declared default
    fn normalize(&self) {
        self.raw.with_bytes_mut(|bytes| {
            if is_zeroed(bytes) {
                T::default().encode(bytes);
            }
        });
    }

    // =========================================================================
    // Value Access
    // =========================================================================

    pub fn value(&self) -> T {
        self.raw.with_bytes(T::decode)
    }

    pub fn set_value(&self, value: &T) {
        self.raw.with_bytes_mut(|bytes| value.encode(bytes));
    }

    /// Read-modify-write under the page's update lock; returns the new value
    pub fn update(&self, f: impl FnOnce(&mut T)) -> T {
        let _guard = self.raw.page().lock_update();
        let mut value = self.value();
        f(&mut value);
        self.set_value(&value);
        value
    }

    /// True if the record equals its declared default (absent / unset)
    pub fn is_default(&self) -> bool {
        self.value() == T::default()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write this record to the file now
    pub fn save(&self) -> Result<()> {
        self.raw.save()
    }

    pub async fn save_async(&self, token: &CancellationToken) -> Result<()> {
        self.raw.save_async(token).await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn offset(&self) -> u64 {
        self.raw.offset()
    }

    /// This record's offset as a link value
    pub fn link(&self) -> Offset {
        Offset::new(self.raw.offset())
    }

    pub fn store(&self) -> &'s FileStore {
        self.raw.store()
    }

    pub fn raw(&self) -> &RawCell<'s> {
        &self.raw
    }

    /// Cache hits on this record's page since it was loaded
    pub fn hits(&self) -> u64 {
        self.raw.page().hits()
    }

    /// View the same window as another record type of identical width
    pub fn cast<U: Record>(self) -> Result<Cell<'s, U>> {
        Cell::bind(self.raw)
    }
}

impl<T: Record> Clone for Cell<'_, T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record + std::fmt::Debug> std::fmt::Debug for Cell<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("offset", &self.offset())
            .field("value", &self.value())
            .finish()
    }
}
