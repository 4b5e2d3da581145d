//! Store Module
//!
//! Durable byte storage with a read-through page cache and coalesced flush.
//!
//! ## Responsibilities
//! - Open/create the backing file and initialize the root record
//! - Hand out non-overlapping ranges from an atomic cursor
//! - Cache record-sized pages by offset, detect dirty pages by fingerprint
//! - Write back explicitly (per record) or in bulk (flush)
//! - Track reclaimed ranges on the free list
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────┬──────────────┬──────────────┬─────
//! │ Root TreeNode (80)   │ Record @80   │ Record @...  │ ...
//! └──────────────────────┴──────────────┴──────────────┴─────
//! ^ offset 0                                   cursor ^
//! ```
//! There is no header: every record is reached through links starting at
//! the root.

mod file;
mod io;
mod page;
mod trash;

pub use file::{FileStore, StoreStats};
pub use page::Page;
pub use trash::{Allocation, Trash, TrashEntry, TRASH_KEY};
pub(crate) use trash::{is_trash_bytes, is_trash_record};
