//! Chain cursors

use std::marker::PhantomData;

use tokio_util::sync::CancellationToken;

use crate::cell::Cell;
use crate::error::Result;
use crate::record::{CollectionItem, Offset};
use crate::store::FileStore;

/// Lazy forward walk over a chain, starting at a head's `Child`
///
/// Yields each element until `Next` is `NONE`. Stops after the first error.
/// Mutating the chain while iterating is not supported.
pub struct Children<'s, T> {
    store: &'s FileStore,
    next: Offset,
    _item: PhantomData<fn() -> T>,
}

impl<'s, T: CollectionItem> Children<'s, T> {
    pub(crate) fn new(store: &'s FileStore, head: Offset) -> Self {
        Self {
            store,
            next: head,
            _item: PhantomData,
        }
    }
}

impl<'s, T: CollectionItem> Iterator for Children<'s, T> {
    type Item = Result<Cell<'s, T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.get()?;
        match Cell::<T>::read(self.store, offset) {
            Ok(cell) => {
                self.next = cell.value().next();
                Some(Ok(cell))
            }
            Err(e) => {
                self.next = Offset::NONE;
                Some(Err(e))
            }
        }
    }
}

/// Async counterpart of `Children`
///
/// Each step may suspend on a page read; the token is checked before it.
pub struct ChildrenAsync<'s, T> {
    store: &'s FileStore,
    next: Offset,
    token: CancellationToken,
    _item: PhantomData<fn() -> T>,
}

impl<'s, T: CollectionItem> ChildrenAsync<'s, T> {
    pub(crate) fn new(store: &'s FileStore, head: Offset, token: &CancellationToken) -> Self {
        Self {
            store,
            next: head,
            token: token.clone(),
            _item: PhantomData,
        }
    }

    /// Next element, or `Ok(None)` at the end of the chain
    pub async fn try_next(&mut self) -> Result<Option<Cell<'s, T>>> {
        let Some(offset) = self.next.get() else {
            return Ok(None);
        };
        match Cell::<T>::read_async(self.store, offset, &self.token).await {
            Ok(cell) => {
                self.next = cell.value().next();
                Ok(Some(cell))
            }
            Err(e) => {
                self.next = Offset::NONE;
                Err(e)
            }
        }
    }
}
