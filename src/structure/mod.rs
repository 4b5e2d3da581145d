//! Structure Module
//!
//! Generic linked structures built from `Next`/`Child` offsets stored in the
//! records themselves. Every operation is an inherent method on `Cell<T>`,
//! available as soon as `T` declares the capabilities it needs.
//!
//! ## Capabilities → Operations
//! ```text
//! Collection      children, find, add, add_new, remove, reclaim, clear
//! Dictionary      get, get_or_add, remove_key
//! TreeDictionary  get_path, get_or_add_path, remove_path, walk
//! ```
//!
//! ## Chain Shape
//! ```text
//!  head.Child ──► [c] ──Next──► [b] ──Next──► [a] ──Next──► NONE
//! ```
//! `add` links at the head, so traversal order is newest first.
//!
//! Every operation that reads pages has an `_async` twin taking a
//! `CancellationToken`. In-memory relinking never suspends.

mod children;
mod collection;
mod dictionary;
mod tree;

pub use children::{Children, ChildrenAsync};
pub use tree::Visit;
