//! Cell Module
//!
//! Short-lived handles onto records in a store.
//!
//! ## Responsibilities
//! - Bind an offset to its cached page (`RawCell`)
//! - Overlay a fixed-layout record on the page (`Cell<T>`)
//! - Normalize zero-filled space to the record's default on creation
//! - Per-handle read-modify-write and explicit per-record save
//!
//! A cell borrows the store it came from and never outlives it.

mod raw;
mod typed;

pub use raw::RawCell;
pub use typed::Cell;
