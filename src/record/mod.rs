//! Record Module
//!
//! Fixed-layout values stored at byte offsets inside the store file.
//!
//! ## Responsibilities
//! - Define the `Record` contract (stable width, explicit codec, Default sentinel)
//! - Define the `Offset` link type with its `NONE` sentinel
//! - Declare the capability markers the structural algorithms are gated on
//!
//! ## Encoding
//! Records are laid out sequentially in field declaration order, unpadded,
//! little-endian. Links are 8-byte signed offsets where `-1` means "no link".
//!
//! ```text
//! TreeNode (80 bytes)
//! ┌──────────────────────┬───────────┬───────────┐
//! │ Key (64, UTF-8, NUL) │ Next (8)  │ Child (8) │
//! └──────────────────────┴───────────┴───────────┘
//! ```

mod capability;
mod inline_str;
mod node;

use bytes::{Buf, BufMut};

pub use capability::{Collection, CollectionItem, Dictionary, DictionaryItem, TreeDictionary};
pub use inline_str::{InlineStr, String64};
pub use node::TreeNode;

// =============================================================================
// Offset
// =============================================================================

/// Absolute byte offset of a record, or `NONE`
///
/// Stored on disk as an `i64`. Zero is a valid offset (the root record), so
/// an all-zero region is never mistaken for an absent link once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset(i64);

impl Offset {
    /// Width of an encoded offset
    pub const SIZE: usize = 8;

    /// "No such link"
    pub const NONE: Offset = Offset(-1);

    /// Wrap a file position
    pub fn new(offset: u64) -> Self {
        debug_assert!(offset <= i64::MAX as u64, "offset out of range");
        Offset(offset as i64)
    }

    /// Wrap a raw on-disk value
    pub fn from_raw(raw: i64) -> Self {
        Offset(raw)
    }

    /// Raw on-disk value
    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 < 0
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    /// File position, or `None` for the sentinel
    pub fn get(self) -> Option<u64> {
        if self.is_none() {
            None
        } else {
            Some(self.0 as u64)
        }
    }

    /// Append the little-endian encoding to `buf`
    pub fn put(self, buf: &mut impl BufMut) {
        buf.put_i64_le(self.0);
    }

    /// Consume an encoded offset from `buf`
    pub fn take(buf: &mut impl Buf) -> Self {
        Offset(buf.get_i64_le())
    }
}

impl Default for Offset {
    fn default() -> Self {
        Offset::NONE
    }
}

impl From<u64> for Offset {
    fn from(offset: u64) -> Self {
        Offset::new(offset)
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(offset) => write!(f, "@{}", offset),
            None => f.write_str("@none"),
        }
    }
}

// =============================================================================
// Record
// =============================================================================

/// A fixed-size value that lives at an offset in the store
///
/// `Default` is the record's declared empty value. It must set every link
/// field to `Offset::NONE`, which is what distinguishes a normalized record
/// from the zero bytes of a freshly grown file region.
pub trait Record: Clone + PartialEq + Default + Send + Sync + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Encode into `buf`, which is exactly `SIZE` bytes
    fn encode(&self, buf: &mut [u8]);

    /// Decode from `buf`, which is exactly `SIZE` bytes
    fn decode(buf: &[u8]) -> Self;

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.encode(&mut buf);
        buf
    }
}

/// True if every byte is zero (an untouched file region)
pub(crate) fn is_zeroed(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}
