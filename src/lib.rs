//! # CellDB
//!
//! An embeddable single-file record store with:
//! - Fixed-layout records addressed by byte offset
//! - Linked lists, dictionaries and trees built from `Next`/`Child` offsets
//!   stored inside the records
//! - A read-through page cache with fingerprint-based dirty detection
//! - Explicit per-record save and parallel batched flush
//! - A free list that recycles reclaimed ranges
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Registry                             │
//! │                 (one store per file path)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Structure                              │
//! │      (children / add / remove / get_or_add / paths)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Cell<T: Record>                           │
//! │           (typed overlay on a cached byte window)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  FileStore  │          │    Trash    │
//!   │ (pages+I/O) │◄─────────│ (free list) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use celldb::{FileStore, String64};
//!
//! # fn main() -> celldb::Result<()> {
//! let store = FileStore::open_path("data.cell")?;
//! let root = store.root()?;
//! let users = root.get_or_add(&String64::new("users"))?;
//! users.get_or_add(&String64::new("alice"))?;
//! store.flush()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod store;
pub mod cell;
pub mod structure;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CellDbError, Result};
pub use config::{Config, GrowthPolicy};
pub use record::{
    Collection, CollectionItem, Dictionary, DictionaryItem, InlineStr, Offset, Record, String64,
    TreeDictionary, TreeNode,
};
pub use store::{FileStore, StoreStats, TRASH_KEY};
pub use cell::{Cell, RawCell};
pub use structure::{Children, ChildrenAsync, Visit};
pub use registry::Registry;

// Async variants take this as their cancellation signal
pub use tokio_util::sync::CancellationToken;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CellDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
