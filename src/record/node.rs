//! Tree dictionary node
//!
//! The root record at offset 0 and every named entry hung beneath it.

use super::{Collection, CollectionItem, DictionaryItem, Offset, Record, String64};

/// Keyed node that is a chain link and the head of its own sub-tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub key: String64,
    pub next: Offset,
    pub child: Offset,
}

impl TreeNode {
    pub fn with_key(key: impl Into<String64>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

impl Default for TreeNode {
    fn default() -> Self {
        Self {
            key: String64::default(),
            next: Offset::NONE,
            child: Offset::NONE,
        }
    }
}

impl Record for TreeNode {
    const SIZE: usize = String64::CAPACITY + Offset::SIZE * 2;

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

impl CollectionItem for TreeNode {
    fn next(&self) -> Offset {
        self.next
    }

    fn set_next(&mut self, next: Offset) {
        self.next = next;
    }
}

impl Collection for TreeNode {
    type Item = TreeNode;

    fn child(&self) -> Offset {
        self.child
    }

    fn set_child(&mut self, child: Offset) {
        self.child = child;
    }
}

impl DictionaryItem for TreeNode {
    type Key = String64;

    fn key(&self) -> &String64 {
        &self.key
    }

    fn set_key(&mut self, key: String64) {
        self.key = key;
    }
}
