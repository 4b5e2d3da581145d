//! Path lookup and traversal over `TreeDictionary` nodes

use tokio_util::sync::CancellationToken;

use crate::cell::Cell;
use crate::error::Result;
use crate::record::{DictionaryItem, TreeDictionary};

/// What `walk` should do after visiting a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Continue into the node's own chain
    Descend,
    /// Leave the node's chain unvisited
    SkipChildren,
}

impl<'s, T: TreeDictionary> Cell<'s, T> {
    /// Follow `keys` one level at a time; an empty path is this node
    pub fn get_path(&self, keys: &[<T as DictionaryItem>::Key]) -> Result<Option<Cell<'s, T>>> {
        let mut node = self.clone();
        for key in keys {
            node = match node.get(key)? {
                Some(child) => child,
                None => return Ok(None),
            };
        }
        Ok(Some(node))
    }

    pub async fn get_path_async(
        &self,
        keys: &[<T as DictionaryItem>::Key],
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T>>> {
        let mut node = self.clone();
        for key in keys {
            node = match node.get_async(key, token).await? {
                Some(child) => child,
                None => return Ok(None),
            };
        }
        Ok(Some(node))
    }

    /// Follow `keys`, creating missing levels on the way
    pub fn get_or_add_path(&self, keys: &[<T as DictionaryItem>::Key]) -> Result<Cell<'s, T>> {
        let mut node = self.clone();
        for key in keys {
            node = node.get_or_add(key)?;
        }
        Ok(node)
    }

    pub async fn get_or_add_path_async(
        &self,
        keys: &[<T as DictionaryItem>::Key],
        token: &CancellationToken,
    ) -> Result<Cell<'s, T>> {
        let mut node = self.clone();
        for key in keys {
            node = node.get_or_add_async(key, token).await?;
        }
        Ok(node)
    }

    /// Unlink the node at the end of `keys` from its parent
    ///
    /// `Ok(None)` if any level is missing or the path is empty.
    pub fn remove_path(&self, keys: &[<T as DictionaryItem>::Key]) -> Result<Option<Cell<'s, T>>> {
        let Some((last, parents)) = keys.split_last() else {
            return Ok(None);
        };
        match self.get_path(parents)? {
            Some(parent) => parent.remove_key(last),
            None => Ok(None),
        }
    }

    pub async fn remove_path_async(
        &self,
        keys: &[<T as DictionaryItem>::Key],
        token: &CancellationToken,
    ) -> Result<Option<Cell<'s, T>>> {
        let Some((last, parents)) = keys.split_last() else {
            return Ok(None);
        };
        match self.get_path_async(parents, token).await? {
            Some(parent) => parent.remove_key_async(last, token).await,
            None => Ok(None),
        }
    }

    /// Depth-first pre-order over every descendant, in chain order
    ///
    /// This node's direct children are at depth 0. Cycles are not detected.
    pub fn walk(&self, mut visit: impl FnMut(usize, &Cell<'s, T>) -> Visit) -> Result<()> {
        let mut stack = Vec::new();
        push_children(&mut stack, self, 0)?;

        while let Some((depth, node)) = stack.pop() {
            if visit(depth, &node) == Visit::Descend {
                push_children(&mut stack, &node, depth + 1)?;
            }
        }
        Ok(())
    }
}

fn push_children<'s, T: TreeDictionary>(
    stack: &mut Vec<(usize, Cell<'s, T>)>,
    node: &Cell<'s, T>,
    depth: usize,
) -> Result<()> {
    let children = node.children().collect::<Result<Vec<_>>>()?;
    stack.extend(children.into_iter().rev().map(|child| (depth, child)));
    Ok(())
}
