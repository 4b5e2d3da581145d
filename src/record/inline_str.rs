//! Fixed-capacity inline text used as a dictionary key.

use std::fmt;

use bytes::{Buf, BufMut};

/// 64-byte key, the width used by `TreeNode`
pub type String64 = InlineStr<64>;

/// UTF-8 text stored inline in exactly `N` bytes
///
/// Longer input is truncated at the last character boundary that fits;
/// shorter input is padded with NUL. Round-trips losslessly for any string
/// of at most `N` bytes that contains no NUL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InlineStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> InlineStr<N> {
    pub const CAPACITY: usize = N;

    pub fn new(text: &str) -> Self {
        let mut end = text.len().min(N);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self { bytes }
    }

    /// Encoded length (up to the first NUL)
    pub fn len(&self) -> usize {
        self.bytes.iter().position(|&b| b == 0).unwrap_or(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text content; bytes read from a damaged file fall back to the valid prefix
    pub fn as_str(&self) -> &str {
        let raw = &self.bytes[..self.len()];
        match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                // valid_up_to is always a char boundary
                std::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default()
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    pub(crate) fn put(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.bytes);
    }

    pub(crate) fn take(buf: &mut impl Buf) -> Self {
        let mut bytes = [0u8; N];
        buf.copy_to_slice(&mut bytes);
        Self { bytes }
    }
}

impl<const N: usize> Default for InlineStr<N> {
    fn default() -> Self {
        Self { bytes: [0u8; N] }
    }
}

impl<const N: usize> From<&str> for InlineStr<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl<const N: usize> From<&String> for InlineStr<N> {
    fn from(text: &String) -> Self {
        Self::new(text)
    }
}

impl<const N: usize> From<InlineStr<N>> for String {
    fn from(value: InlineStr<N>) -> Self {
        value.as_str().to_string()
    }
}

impl<const N: usize> PartialEq<str> for InlineStr<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for InlineStr<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> fmt::Display for InlineStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for InlineStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}
