//! Capability markers
//!
//! Each trait is one narrow structural contract. Generic algorithms in
//! `structure` are bounded by exactly the capabilities they touch, so any
//! record type opting into the right set gets them for free.

use super::{Offset, Record};

/// A record that can be linked into a chain (exposes `Next`)
pub trait CollectionItem: Record {
    fn next(&self) -> Offset;
    fn set_next(&mut self, next: Offset);
}

/// A record that heads a chain (exposes `Child`)
pub trait Collection: Record {
    /// Record type of the chain elements
    type Item: CollectionItem;

    fn child(&self) -> Offset;
    fn set_child(&mut self, child: Offset);
}

/// A chain element carrying a lookup key
pub trait DictionaryItem: CollectionItem {
    type Key: PartialEq + Clone + Send + Sync;

    fn key(&self) -> &Self::Key;
    fn set_key(&mut self, key: Self::Key);
}

/// A chain head whose elements are keyed
pub trait Dictionary: Collection
where
    Self::Item: DictionaryItem,
{
}

impl<T> Dictionary for T
where
    T: Collection,
    T::Item: DictionaryItem,
{
}

/// A keyed node that is both a chain link and the head of its own sub-tree
pub trait TreeDictionary: Collection<Item = Self> + DictionaryItem {}

impl<T> TreeDictionary for T where T: Collection<Item = T> + DictionaryItem {}
