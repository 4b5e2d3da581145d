//! Keyed lookup over a chain of `DictionaryItem`s

use tokio_util::sync::CancellationToken;

use crate::cell::Cell;
use crate::error::Result;
use crate::record::{Collection, Dictionary, DictionaryItem};

type Key<T> = <<T as Collection>::Item as DictionaryItem>::Key;

impl<'s, T> Cell<'s, T>
where
    T: Dictionary,
    T::Item: DictionaryItem,
{
    /// First element whose key equals `key`; linear in chain length
    pub fn get(&self, key: &Key<T>) -> Result<Option<Cell<'s, T::Item>>> {
        self.find(|item| item.key() == key)
    }

    pub async fn get_async(
        &self,
        key: &Key<T>,
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        self.find_async(|item| item.key() == key, token).await
    }

    /// Existing element for `key`, or a new one linked at the head
    ///
    /// An existing element keeps its position. Two callers racing on the
    /// same missing key can both insert; serialize them if that matters.
    pub fn get_or_add(&self, key: &Key<T>) -> Result<Cell<'s, T::Item>> {
        self.guard_key(key)?;
        if let Some(found) = self.get(key)? {
            return Ok(found);
        }
        let item = Cell::<T::Item>::create_with(self.store(), |item| item.set_key(key.clone()))?;
        self.add(&item)?;
        Ok(item)
    }

    pub async fn get_or_add_async(
        &self,
        key: &Key<T>,
        token: &CancellationToken,
    ) -> Result<Cell<'s, T::Item>> {
        self.guard_key(key)?;
        if let Some(found) = self.get_async(key, token).await? {
            return Ok(found);
        }
        let item = Cell::<T::Item>::create_with_async(
            self.store(),
            |item| item.set_key(key.clone()),
            token,
        )
        .await?;
        self.add(&item)?;
        Ok(item)
    }

    /// Unlink the first element with `key`
    pub fn remove_key(&self, key: &Key<T>) -> Result<Option<Cell<'s, T::Item>>> {
        self.guard_key(key)?;
        self.remove_first(|child| child.value().key() == key)
    }

    pub async fn remove_key_async(
        &self,
        key: &Key<T>,
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T::Item>>> {
        self.guard_key(key)?;
        self.remove_first_async(|child| child.value().key() == key, token)
            .await
    }

    fn guard_key(&self, key: &Key<T>) -> Result<()> {
        let mut candidate = T::Item::default();
        candidate.set_key(key.clone());
        self.guard_reserved(&candidate)
    }
}
